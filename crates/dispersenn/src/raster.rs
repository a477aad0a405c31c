//! Target rasterization, normalization and rendering.
//!
//! A target map is a PNG whose blue channel encodes dispersal and whose red
//! channel encodes density. Each is log-transformed, averaged onto a coarse
//! `coarseness × coarseness` grid, and block-replicated back up to
//! `size_out × size_out`:
//!
//! ```text
//! PNG [H, W, 4] ──ln──► ChannelPair<[H, W]> ──coarsen──► [c, c] ──replicate──► [size_out, size_out]
//! ```
//!
//! Corpus-wide [`NormStats`] (per-channel mean and population standard
//! deviation) standardize the targets for training and are inverted for
//! prediction output.

use image::{Rgba, RgbaImage};
use ndarray::{s, Array2, Array3, Axis};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;
use tracing::debug;

use crate::channels::{Channel, ChannelPair};
use crate::error::DatasetError;

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// Decode `path` into per-channel log intensities.
///
/// Any PNG colour type is accepted; samples are scaled to `[0, 1]` first.
pub fn read_log_field(path: &Path) -> Result<ChannelPair<Array2<f64>>, DatasetError> {
    let img = image::open(path)
        .map_err(|e| DatasetError::image(path, e.to_string()))?
        .to_rgba32f();
    let (w, h) = (img.width() as usize, img.height() as usize);

    let mut field = ChannelPair::from_fn(|_| Array2::<f64>::zeros((h, w)));
    for (x, y, px) in img.enumerate_pixels() {
        let (row, col) = (y as usize, x as usize);
        for channel in Channel::ALL {
            let value = f64::from(match channel {
                Channel::Dispersal => px[2],
                Channel::Density => px[0],
            });
            if value <= 0.0 {
                return Err(DatasetError::NonPositiveIntensity {
                    channel: channel.name(),
                    row,
                    col,
                    value,
                });
            }
            field.get_mut(channel)[[row, col]] = value.ln();
        }
    }
    Ok(field)
}

/// Average `field` onto a `coarseness × coarseness` grid.
///
/// Cell `(m, k)` covers rows `[ceil(H/c·m), floor(H/c·(m+1)))` and the
/// matching column range, so fractional edge pixels are dropped.
pub fn coarsen(field: &Array2<f64>, coarseness: usize) -> Result<Array2<f64>, DatasetError> {
    let (h, w) = field.dim();
    let bounds = |extent: usize, m: usize| {
        let step = extent as f64 / coarseness as f64;
        ((step * m as f64).ceil() as usize, ((step * (m + 1) as f64).floor() as usize).min(extent))
    };

    let mut out = Array2::<f64>::zeros((coarseness, coarseness));
    for m in 0..coarseness {
        let (r0, r1) = bounds(h, m);
        for k in 0..coarseness {
            let (c0, c1) = bounds(w, k);
            if r1 <= r0 || c1 <= c0 {
                return Err(DatasetError::EmptyWindow { row: m, col: k, height: h, width: w });
            }
            let window = field.slice(s![r0..r1, c0..c1]);
            out[[m, k]] = window.sum() / window.len() as f64;
        }
    }
    Ok(out)
}

/// Nearest-neighbour block replication by `factor` along both axes.
pub fn replicate(coarse: &Array2<f64>, factor: usize) -> Array2<f64> {
    let (h, w) = coarse.dim();
    Array2::from_shape_fn((h * factor, w * factor), |(r, c)| coarse[[r / factor, c / factor]])
}

/// Read a target PNG and produce the `size_out × size_out` log maps.
///
/// `coarseness` must divide `size_out`.
pub fn read_map(
    path: &Path,
    coarseness: usize,
    size_out: usize,
) -> Result<ChannelPair<Array2<f32>>, DatasetError> {
    if coarseness == 0 || size_out % coarseness != 0 {
        return Err(DatasetError::format(format!(
            "grid coarseness {coarseness} does not divide output size {size_out}"
        )));
    }
    let factor = size_out / coarseness;
    let field = read_log_field(path)?;
    let maps = field.try_map(|_, f| {
        coarsen(&f, coarseness).map(|c| replicate(&c, factor).mapv(|v| v as f32))
    })?;
    debug!(path = %path.display(), coarseness, size_out, "rasterized target");
    Ok(maps)
}

// ---------------------------------------------------------------------------
// On-disk target layout
// ---------------------------------------------------------------------------

/// Stack a channel pair into the channel-last `[H, W, 2]` layout.
pub fn stack_channels(maps: &ChannelPair<Array2<f32>>) -> Result<Array3<f32>, DatasetError> {
    let views = [maps.dispersal.view(), maps.density.view()];
    ndarray::stack(Axis(2), &views).map_err(|e| DatasetError::format(format!("cannot stack channels: {e}")))
}

/// Split a channel-last `[H, W, 2]` array into a channel pair.
pub fn split_channels(stacked: &Array3<f32>) -> Result<ChannelPair<Array2<f32>>, DatasetError> {
    if stacked.len_of(Axis(2)) != 2 {
        return Err(DatasetError::format(format!(
            "expected 2 channels in last axis, got shape {:?}",
            stacked.shape()
        )));
    }
    Ok(ChannelPair::from_fn(|c| stacked.index_axis(Axis(2), c.index()).to_owned()))
}

/// Write maps as `[H, W, 2]` f32 NPY.
pub fn save_target(path: &Path, maps: &ChannelPair<Array2<f32>>) -> Result<(), DatasetError> {
    let stacked = stack_channels(maps)?;
    ndarray_npy::write_npy(path, &stacked).map_err(|e| DatasetError::npy(path, e.to_string()))
}

/// Read maps from `[H, W, 2]` f32 NPY.
pub fn load_target(path: &Path) -> Result<ChannelPair<Array2<f32>>, DatasetError> {
    let stacked: Array3<f32> =
        ndarray_npy::read_npy(path).map_err(|e| DatasetError::npy(path, e.to_string()))?;
    split_channels(&stacked)
}

// ---------------------------------------------------------------------------
// NormStats
// ---------------------------------------------------------------------------

/// Mean and population standard deviation of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ChannelStats {
    /// Mean.
    pub mean: f64,
    /// Population standard deviation.
    pub sd: f64,
}

/// Per-channel normalization statistics over a corpus of target maps.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NormStats {
    /// Statistics per channel.
    pub channels: ChannelPair<ChannelStats>,
}

impl NormStats {
    /// Build from explicit values.
    pub fn new(dispersal: ChannelStats, density: ChannelStats) -> Self {
        NormStats { channels: ChannelPair::new(dispersal, density) }
    }

    /// Statistics over `maps`, streamed one map at a time.
    pub fn from_maps<'a, I>(maps: I) -> Result<Self, DatasetError>
    where
        I: IntoIterator<Item = &'a ChannelPair<Array2<f32>>>,
    {
        let mut acc = StatsAccumulator::default();
        for m in maps {
            acc.push(m);
        }
        acc.finish()
    }

    fn checked(&self, channel: Channel) -> Result<ChannelStats, DatasetError> {
        let st = *self.channels.get(channel);
        if !(st.sd > 0.0) || !st.sd.is_finite() || !st.mean.is_finite() {
            return Err(DatasetError::DegenerateStats {
                channel: channel.name(),
                reason: format!("mean={}, sd={}", st.mean, st.sd),
            });
        }
        Ok(st)
    }

    /// `(x − mean) / sd` per channel.
    pub fn normalize(&self, maps: &ChannelPair<Array2<f32>>) -> Result<ChannelPair<Array2<f32>>, DatasetError> {
        maps.each_ref().try_map(|c, m| {
            let st = self.checked(c)?;
            Ok(m.mapv(|v| ((f64::from(v) - st.mean) / st.sd) as f32))
        })
    }

    /// `x · sd + mean` per channel.
    pub fn denormalize(&self, maps: &ChannelPair<Array2<f32>>) -> Result<ChannelPair<Array2<f32>>, DatasetError> {
        maps.each_ref().try_map(|c, m| {
            let st = self.checked(c)?;
            Ok(m.mapv(|v| (f64::from(v) * st.sd + st.mean) as f32))
        })
    }

    /// `[2, 2]` array, rows = channel, columns = (mean, sd).
    pub fn to_array(&self) -> Array2<f64> {
        let mut a = Array2::<f64>::zeros((2, 2));
        for (c, st) in self.channels.iter() {
            a[[c.index(), 0]] = st.mean;
            a[[c.index(), 1]] = st.sd;
        }
        a
    }

    /// Inverse of [`NormStats::to_array`].
    pub fn from_array(a: &Array2<f64>) -> Result<Self, DatasetError> {
        if a.dim() != (2, 2) {
            return Err(DatasetError::format(format!("stats array must be 2x2, got {:?}", a.shape())));
        }
        Ok(NormStats {
            channels: ChannelPair::from_fn(|c| ChannelStats { mean: a[[c.index(), 0]], sd: a[[c.index(), 1]] }),
        })
    }

    /// Persist as `mean_sd.npy`-style `[2, 2]` f64.
    pub fn save_npy(&self, path: &Path) -> Result<(), DatasetError> {
        ndarray_npy::write_npy(path, &self.to_array()).map_err(|e| DatasetError::npy(path, e.to_string()))
    }

    /// Load from a `[2, 2]` f64 NPY.
    pub fn load_npy(path: &Path) -> Result<Self, DatasetError> {
        let a: Array2<f64> = ndarray_npy::read_npy(path).map_err(|e| DatasetError::npy(path, e.to_string()))?;
        Self::from_array(&a)
    }

    /// Persist as pretty JSON.
    pub fn save_json(&self, path: &Path) -> Result<(), DatasetError> {
        let json = serde_json::to_string_pretty(self).map_err(|e| DatasetError::format(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| DatasetError::io_error(path, e))
    }

    /// Load from JSON.
    pub fn load_json(path: &Path) -> Result<Self, DatasetError> {
        let text = std::fs::read_to_string(path).map_err(|e| DatasetError::io_error(path, e))?;
        serde_json::from_str(&text).map_err(|e| DatasetError::format(format!("{}: {e}", path.display())))
    }
}

/// Streaming per-channel mean/variance accumulator.
///
/// Batches are merged with the parallel-variance update, so results do not
/// depend on how the corpus is chunked.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatsAccumulator {
    count: ChannelPair<u64>,
    mean: ChannelPair<f64>,
    m2: ChannelPair<f64>,
}

impl StatsAccumulator {
    /// Fold one pair of maps in.
    pub fn push(&mut self, maps: &ChannelPair<Array2<f32>>) {
        for (c, m) in maps.iter() {
            let nb = m.len() as u64;
            if nb == 0 {
                continue;
            }
            let mean_b = m.iter().map(|&v| f64::from(v)).sum::<f64>() / nb as f64;
            let m2_b = m.iter().map(|&v| (f64::from(v) - mean_b).powi(2)).sum::<f64>();

            let na = *self.count.get(c);
            let mean_a = *self.mean.get(c);
            let n = na + nb;
            let delta = mean_b - mean_a;
            *self.mean.get_mut(c) = mean_a + delta * nb as f64 / n as f64;
            *self.m2.get_mut(c) += m2_b + delta * delta * (na as f64) * (nb as f64) / n as f64;
            *self.count.get_mut(c) = n;
        }
    }

    /// Values seen per channel.
    pub fn count(&self) -> u64 {
        self.count.dispersal
    }

    /// Final statistics.
    pub fn finish(&self) -> Result<NormStats, DatasetError> {
        let channels = self.count.try_map(|c, n| {
            if n == 0 {
                return Err(DatasetError::DegenerateStats {
                    channel: c.name(),
                    reason: "no values accumulated".into(),
                });
            }
            Ok(ChannelStats { mean: *self.mean.get(c), sd: (self.m2.get(c) / n as f64).sqrt() })
        })?;
        Ok(NormStats { channels })
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Render one channel as RGBA `(0, 0, v, v)` with `v = clip(round(x·255))`.
pub fn render_channel(map: &Array2<f32>) -> RgbaImage {
    let (h, w) = map.dim();
    RgbaImage::from_fn(w as u32, h as u32, |x, y| {
        let v = (f64::from(map[[y as usize, x as usize]]) * 255.0).round_ties_even().clamp(0.0, 255.0) as u8;
        Rgba([0, 0, v, v])
    })
}

/// Render and write one channel as PNG.
pub fn save_channel_png(path: &Path, map: &Array2<f32>) -> Result<(), DatasetError> {
    render_channel(map)
        .save(path)
        .map_err(|e| DatasetError::image(path, e.to_string()))
}

/// One tab-separated prediction record: `id, size, truth…, prediction…`.
///
/// Values are flattened in channel-last order to match the NPY layout.
pub fn prediction_record(
    id: &str,
    truth: &ChannelPair<Array2<f32>>,
    prediction: &ChannelPair<Array2<f32>>,
) -> Result<String, DatasetError> {
    let size = truth.dispersal.nrows();
    let mut line = format!("{id}\t{size}");
    for maps in [truth, prediction] {
        for v in stack_channels(maps)?.iter() {
            // Writing to a String cannot fail.
            let _ = write!(line, "\t{v}");
        }
    }
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn coarsen_even_windows() {
        let field = Array2::from_shape_fn((4, 4), |(r, c)| (r * 4 + c) as f64);
        let out = coarsen(&field, 2).unwrap();
        assert_eq!(out, array![[2.5, 4.5], [10.5, 12.5]]);
    }

    #[test]
    fn coarsen_drops_fractional_edges() {
        // 5 / 2 = 2.5: cell 0 covers [0, 2), cell 1 covers [3, 5).
        let field = Array2::from_shape_fn((5, 5), |(r, _)| r as f64);
        let out = coarsen(&field, 2).unwrap();
        assert_eq!(out[[0, 0]], 0.5);
        assert_eq!(out[[1, 0]], 3.5);
    }

    #[test]
    fn coarsen_empty_window_errors() {
        let field = Array2::<f64>::zeros((3, 3));
        assert!(matches!(coarsen(&field, 4), Err(DatasetError::EmptyWindow { .. })));
    }

    #[test]
    fn replicate_blocks() {
        let out = replicate(&array![[1.0, 2.0], [3.0, 4.0]], 3);
        assert_eq!(out.dim(), (6, 6));
        assert_eq!(out[[2, 2]], 1.0);
        assert_eq!(out[[3, 5]], 4.0);
    }

    #[test]
    fn accumulator_matches_population_stats() {
        let a = ChannelPair::new(array![[1.0f32, 2.0]], array![[0.0f32, 0.0]]);
        let b = ChannelPair::new(array![[3.0f32, 4.0]], array![[2.0f32, 2.0]]);
        let stats = NormStats::from_maps([&a, &b]).unwrap();
        assert_abs_diff_eq!(stats.channels.dispersal.mean, 2.5, epsilon = 1e-12);
        assert_abs_diff_eq!(stats.channels.dispersal.sd, 1.25f64.sqrt(), epsilon = 1e-12);
        assert_abs_diff_eq!(stats.channels.density.sd, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn zero_sd_is_rejected() {
        let stats = NormStats::new(ChannelStats { mean: 0.0, sd: 1.0 }, ChannelStats { mean: 0.0, sd: 0.0 });
        let maps = ChannelPair::from_fn(|_| Array2::<f32>::zeros((2, 2)));
        assert!(matches!(stats.normalize(&maps), Err(DatasetError::DegenerateStats { channel: "density", .. })));
    }

    #[test]
    fn render_scales_and_clips() {
        let img = render_channel(&array![[0.0f32, 0.5, -1.0, 2.0]]);
        let blue: Vec<u8> = img.pixels().map(|p| p[2]).collect();
        assert_eq!(blue, vec![0, 128, 0, 255]);
        assert_eq!(img.get_pixel(3, 0), &Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn prediction_record_layout() {
        let t = ChannelPair::new(array![[1.0f32]], array![[2.0f32]]);
        let p = ChannelPair::new(array![[3.0f32]], array![[4.0f32]]);
        assert_eq!(prediction_record("7", &t, &p).unwrap(), "7\t1\t1\t2\t3\t4");
    }
}
