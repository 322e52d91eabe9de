use std::fs;
use std::path::Path;

use crate::detector::Detector;
use crate::extract::AnswerDecoder;
use crate::geometry::Rect;
use crate::image::io::save_png;
use crate::image::{Image, Resizer};
use crate::scan::Scorer;
use crate::trace::{trace_event, trace_warn};
use crate::util::{DetectError, DetectResult};

impl<S, A, R> Detector<S, A, R>
where
    S: Scorer,
    A: AnswerDecoder,
    R: Resizer,
{
    /// Writes the canvas window and the original crop of each detection.
    ///
    /// Files land in `dir/preprocessed/<label>/` and `dir/original/<label>/`
    /// as `<frame>_<label><NNN>.png`, numbered by a per-class counter that
    /// keeps running across frames. At most `max_crops_per_frame` detections
    /// are written, strongest first. Crops that cannot be taken are skipped
    /// with a warning. Returns the number of files written.
    pub fn save_crops(&mut self, dir: impl AsRef<Path>, frame: &str) -> DetectResult<usize> {
        let dir = dir.as_ref();
        let limit = self
            .config
            .max_crops_per_frame
            .unwrap_or(self.detections.len());
        let mut written = 0;
        for (i, det) in self.detections.iter().take(limit).enumerate() {
            let label = match self.labels.get(det.class_id) {
                Some(label) => label.clone(),
                None => det.class_id.to_string(),
            };
            if self.crop_counters.len() <= det.class_id {
                self.crop_counters.resize(det.class_id + 1, 0);
            }
            let counter = self.crop_counters[det.class_id];
            self.crop_counters[det.class_id] += 1;
            let file = format!("{frame}_{label}{counter:03}.png");

            match self.driver.canvas(det.scale_index) {
                Ok(canvas) => {
                    let window = &det.network_input_box;
                    if write_crop(canvas, window, dir, "preprocessed", &label, &file)? {
                        written += 1;
                    }
                }
                Err(err) => trace_warn!("not saving window of detection {}: {}", i, err),
            }
            if let Some(source) = &self.source {
                if write_crop(source, &det.rect, dir, "original", &label, &file)? {
                    written += 1;
                }
            }
        }
        trace_event!("crops_saved", files = written);
        Ok(written)
    }
}

/// Crops `region` out of `image` and saves it; returns `false` when the
/// region does not fit.
fn write_crop<T>(
    image: &Image,
    region: &Rect<T>,
    dir: &Path,
    kind: &str,
    label: &str,
    file: &str,
) -> DetectResult<bool> {
    let crop = match image.crop(region) {
        Ok(crop) => crop,
        Err(err) => {
            trace_warn!("not saving {} crop {}: {}", kind, file, err);
            return Ok(false);
        }
    };
    let subdir = dir.join(kind).join(label);
    fs::create_dir_all(&subdir).map_err(|err| DetectError::io(&subdir, err))?;
    save_png(&crop, subdir.join(file))?;
    Ok(true)
}
