use std::path::PathBuf;

use chrono::Utc;
use uuid::Uuid;

use crate::detection::domain::detection::BoundingBox;
use crate::shared::frame::Frame;
use crate::storage::domain::snapshot_store::SnapshotStore;

/// Saves alert snapshots as PNG crops under a captures directory.
///
/// Filenames combine the caller's hint, a timestamp, and a short unique id
/// so concurrent sessions never collide.
pub struct FileSnapshotStore {
    dir: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn unique_name(hint: &str) -> String {
        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        let id = Uuid::new_v4().simple().to_string();
        format!("{hint}_{stamp}_{}.png", &id[..8])
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn save(
        &self,
        frame: &Frame,
        bbox: &BoundingBox,
        hint: &str,
    ) -> Result<String, Box<dyn std::error::Error>> {
        let x1 = (bbox.x1.max(0.0) as u32).min(frame.width().saturating_sub(1));
        let y1 = (bbox.y1.max(0.0) as u32).min(frame.height().saturating_sub(1));
        let x2 = (bbox.x2.max(0.0) as u32).min(frame.width());
        let y2 = (bbox.y2.max(0.0) as u32).min(frame.height());
        if x2 <= x1 || y2 <= y1 {
            return Err("snapshot box lies outside the frame".into());
        }

        let (w, h) = (x2 - x1, y2 - y1);
        let mut crop = image::RgbImage::new(w, h);
        let pixels = frame.as_ndarray();
        for row in 0..h {
            for col in 0..w {
                let src_row = (y1 + row) as usize;
                let src_col = (x1 + col) as usize;
                crop.put_pixel(
                    col,
                    row,
                    image::Rgb([
                        pixels[[src_row, src_col, 0]],
                        pixels[[src_row, src_col, 1]],
                        pixels[[src_row, src_col, 2]],
                    ]),
                );
            }
        }

        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(Self::unique_name(hint));
        crop.save(&path)?;
        Ok(path.display().to_string())
    }
}
