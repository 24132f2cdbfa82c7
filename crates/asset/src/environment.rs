//! Equirectangular environment maps.
//! Decoded to linear RGB f32 on the CPU, converted to RGBA16F for upload.

use std::io::Cursor;
use std::path::Path;

use anyhow::{Context, Result, ensure};
use image::{DynamicImage, ImageReader};

use crate::source::AssetSource;

/// Linear HDR panorama, 3 floats per pixel, row-major from the top.
#[derive(Clone, Debug)]
pub struct EnvironmentMap {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
}

impl EnvironmentMap {
    /// Load from a file (`.hdr`, or any LDR format the decoder knows).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        log::info!("Loading environment map from {:?}", path);

        let img = ImageReader::open(path)
            .with_context(|| format!("Failed to open environment map {:?}", path))?
            .with_guessed_format()
            .with_context(|| format!("Failed to sniff format of {:?}", path))?
            .decode()
            .with_context(|| format!("Failed to decode environment map {:?}", path))?;

        let env = Self::from_image(img)?;
        log::info!(
            "Loaded environment map {}x{} ({} texels)",
            env.width,
            env.height,
            env.data.len() / 3
        );
        Ok(env)
    }

    /// Load from a local path or an `http(s)://` URL.
    pub fn from_source(source: &AssetSource) -> Result<Self> {
        match source {
            AssetSource::Path(path) => Self::load(path),
            AssetSource::Url(_) => {
                let bytes = source.read_bytes()?;
                let env = Self::from_bytes(&bytes)
                    .with_context(|| format!("Failed to decode environment map from {source}"))?;
                log::info!("Loaded environment map {}x{} from {source}", env.width, env.height);
                Ok(env)
            }
        }
    }

    /// Decode from an in-memory file.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let img = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .context("Failed to sniff environment map format")?
            .decode()
            .context("Failed to decode environment map")?;
        Self::from_image(img)
    }

    pub fn from_image(img: DynamicImage) -> Result<Self> {
        let rgb = img.into_rgb32f();
        let (width, height) = rgb.dimensions();
        ensure!(width > 0 && height > 0, "Environment map has zero size");
        Ok(Self {
            width,
            height,
            data: rgb.into_raw(),
        })
    }

    /// 1x1 black map: "no environment lighting".
    pub fn black() -> Self {
        Self {
            width: 1,
            height: 1,
            data: vec![0.0; 3],
        }
    }

    pub fn is_valid(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.data.len() == (self.width * self.height * 3) as usize
    }

    /// Mean radiance, handy for logging and as a cheap ambient estimate.
    pub fn average(&self) -> [f32; 3] {
        let n = (self.data.len() / 3).max(1) as f32;
        let mut sum = [0.0f32; 3];
        for px in self.data.chunks_exact(3) {
            sum[0] += px[0];
            sum[1] += px[1];
            sum[2] += px[2];
        }
        [sum[0] / n, sum[1] / n, sum[2] / n]
    }

    /// Half-size copy using a 2x2 box filter (odd edges clamp).
    pub fn downsample(&self) -> Self {
        let w = (self.width / 2).max(1);
        let h = (self.height / 2).max(1);
        let mut data = Vec::with_capacity((w * h * 3) as usize);
        let texel = |x: u32, y: u32, c: usize| {
            let x = x.min(self.width - 1);
            let y = y.min(self.height - 1);
            self.data[((y * self.width + x) * 3) as usize + c]
        };
        for y in 0..h {
            for x in 0..w {
                let (sx, sy) = (x * 2, y * 2);
                for c in 0..3 {
                    let s = texel(sx, sy, c)
                        + texel(sx + 1, sy, c)
                        + texel(sx, sy + 1, c)
                        + texel(sx + 1, sy + 1, c);
                    data.push(s * 0.25);
                }
            }
        }
        Self {
            width: w,
            height: h,
            data,
        }
    }

    /// This map followed by successively halved levels down to 1x1.
    pub fn mip_chain(&self) -> Vec<EnvironmentMap> {
        let mut chain = vec![self.clone()];
        while let Some(last) = chain.last() {
            if last.width == 1 && last.height == 1 {
                break;
            }
            let next = last.downsample();
            chain.push(next);
        }
        chain
    }

    /// RGBA16F texel bytes (little-endian), alpha = 1.
    pub fn to_rgba16f_bytes(&self) -> Vec<u8> {
        let one = half::f16::from_f32(1.0).to_le_bytes();
        let mut out = Vec::with_capacity(self.data.len() / 3 * 8);
        for px in self.data.chunks_exact(3) {
            for &c in px {
                // f16 overflows past 65504; sun texels can exceed that.
                let c = if c.is_finite() { c.clamp(0.0, 65504.0) } else { 0.0 };
                out.extend_from_slice(&half::f16::from_f32(c).to_le_bytes());
            }
            out.extend_from_slice(&one);
        }
        out
    }
}
