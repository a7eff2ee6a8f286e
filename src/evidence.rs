// Evidence writer
//
// Crops each accepted detection out of its frame and saves it as a JPEG in the
// evidence directory. The detection row references the file by name only.
// A failed write degrades the detection to "no evidence"; it never blocks storage.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use image::codecs::jpeg::JpegEncoder;

use crate::constants::{EVIDENCE_EXTENSION, TEMP_FILE_PREFIX};
use crate::detector::Candidate;
use crate::error::{LogoTrackError, Result};
use crate::media::Frame;

#[derive(Debug, Clone)]
pub struct EvidenceWriter {
    dir: PathBuf,
    quality: u8,
}

impl EvidenceWriter {
    pub fn new(dir: impl Into<PathBuf>, quality: u8) -> Self {
        Self {
            dir: dir.into(),
            quality: quality.clamp(1, 100),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ensure_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    /// Deterministic evidence name. `ordinal` is the detection's position
    /// within its frame, so two boxes of equal brand and confidence never collide.
    pub fn file_name(video_name: &str, frame_index: u64, brand: &str, confidence: f64, ordinal: usize) -> String {
        format!(
            "{}_frame{}_{}_{:.2}_{}.{}",
            sanitize(video_name),
            frame_index,
            sanitize(brand),
            confidence,
            ordinal,
            EVIDENCE_EXTENSION
        )
    }

    /// Crop and write one detection. `Ok(None)` when the crop has zero area.
    pub fn write(&self, video_name: &str, frame: &Frame, detection: &Candidate, ordinal: usize) -> Result<Option<String>> {
        let (width, height) = frame.image.dimensions();
        let Some((x, y, w, h)) = detection.bbox.crop_rect(width, height) else {
            return Ok(None);
        };

        let crop = image::imageops::crop_imm(&frame.image, x, y, w, h).to_image();
        let name = Self::file_name(video_name, frame.index, &detection.label, detection.confidence, ordinal);
        let final_path = self.dir.join(&name);
        let tmp_path = self.dir.join(format!("{}{}", TEMP_FILE_PREFIX, name));

        let written = (|| -> Result<()> {
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            JpegEncoder::new_with_quality(&mut writer, self.quality)
                .encode(crop.as_raw(), w, h, image::ColorType::Rgb8)?;
            writer.flush()?;
            drop(writer);
            std::fs::rename(&tmp_path, &final_path)?;
            Ok(())
        })();

        if let Err(e) = written {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(LogoTrackError::EvidenceWrite(format!("{}: {}", final_path.display(), e)));
        }

        Ok(Some(name))
    }

    /// Like `write`, but failures are logged and yield no evidence.
    pub fn capture(&self, video_name: &str, frame: &Frame, detection: &Candidate, ordinal: usize) -> Option<String> {
        match self.write(video_name, frame, detection, ordinal) {
            Ok(name) => name,
            Err(e) => {
                log::warn!(
                    "Evidence for {} frame {} ({}) not saved: {}",
                    video_name, frame.index, detection.label, e
                );
                None
            }
        }
    }

    /// Absolute path for a stored reference. Only the file name is honoured.
    pub fn resolve(&self, image_ref: &str) -> Option<PathBuf> {
        Path::new(image_ref)
            .file_name()
            .map(|name| self.dir.join(name))
    }

    /// Best-effort delete. Returns true when a file was removed.
    pub fn remove(&self, image_ref: &str) -> bool {
        let Some(path) = self.resolve(image_ref) else {
            log::warn!("Evidence reference '{}' has no file name", image_ref);
            return false;
        };

        if !path.exists() {
            log::warn!("Evidence file not found: {}", path.display());
            return false;
        }

        match std::fs::remove_file(&path) {
            Ok(()) => {
                log::info!("Evidence removed: {}", path.display());
                true
            }
            Err(e) => {
                log::error!("Failed to remove evidence {}: {}", path.display(), e);
                false
            }
        }
    }
}

fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect()
}
