//! Output sink for transferred pages
//!
//! Pages delivered as raw buffers are decoded and written to the output
//! directory as `<prefix>_<YYYYmmdd_HHMMSS>_<sequence>.<ext>`. The sequence
//! counter is per run, so names stay unique even when several pages arrive
//! within the same second. Pages the driver already wrote to disk are only
//! recorded.

use crate::core::config::{OutputFormat, ScanConfiguration};
use crate::core::error::{Result, ScanError};
use chrono::Local;
use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, DynamicImage, ImageFormat};
use log::{debug, info};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// Destination of received pages
pub trait ImageSink {
    /// Decode a raw page buffer and persist it. Returns the written path.
    fn persist_buffer(&mut self, data: &[u8]) -> Result<PathBuf>;

    /// Record a page the driver already wrote to `path`
    fn record_file(&mut self, path: &Path) -> Result<PathBuf>;
}

/// Writes pages into a directory
#[derive(Debug)]
pub struct DirectorySink {
    directory: PathBuf,
    format: OutputFormat,
    jpeg_quality: u8,
    prefix: String,
    sequence: u64,
    saved: Vec<PathBuf>,
}

impl DirectorySink {
    pub fn new(directory: impl Into<PathBuf>, format: OutputFormat) -> Self {
        Self {
            directory: directory.into(),
            format,
            jpeg_quality: 90,
            prefix: "scan".to_string(),
            sequence: 0,
            saved: Vec::new(),
        }
    }

    pub fn from_config(config: &ScanConfiguration) -> Self {
        Self::new(&config.output_dir, config.output_format)
            .with_quality(config.jpeg_quality)
            .with_prefix(&config.file_prefix)
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }

    pub fn with_prefix(mut self, prefix: &str) -> Self {
        if !prefix.is_empty() {
            self.prefix = prefix.to_string();
        }
        self
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Every page persisted or recorded so far, in arrival order
    pub fn saved(&self) -> &[PathBuf] {
        &self.saved
    }

    fn next_path(&mut self) -> PathBuf {
        let name = format!(
            "{}_{}_{}.{}",
            self.prefix,
            Local::now().format("%Y%m%d_%H%M%S"),
            self.sequence,
            self.format.extension()
        );
        self.sequence += 1;
        self.directory.join(name)
    }

    fn write_image(&self, image: &DynamicImage, path: &Path) -> Result<()> {
        match self.format {
            OutputFormat::Jpeg => {
                // JPEG has no alpha channel
                let image = match image.color() {
                    ColorType::L8 | ColorType::Rgb8 => image.clone(),
                    ColorType::L16 | ColorType::La8 | ColorType::La16 => {
                        DynamicImage::ImageLuma8(image.to_luma8())
                    }
                    _ => DynamicImage::ImageRgb8(image.to_rgb8()),
                };
                let file = File::create(path).map_err(|e| {
                    ScanError::IoError(format!(
                        "Failed to create file '{}': {}",
                        path.display(),
                        e
                    ))
                })?;
                let encoder = JpegEncoder::new_with_quality(BufWriter::new(file), self.jpeg_quality);
                image.write_with_encoder(encoder)?;
            }
            OutputFormat::Png => {
                image.save_with_format(path, ImageFormat::Png)?;
            }
        }
        Ok(())
    }
}

impl ImageSink for DirectorySink {
    fn persist_buffer(&mut self, data: &[u8]) -> Result<PathBuf> {
        let image = image::load_from_memory(data)?;
        debug!(
            "Decoded page: {}x{} {:?}",
            image.width(),
            image.height(),
            image.color()
        );

        fs::create_dir_all(&self.directory).map_err(|e| {
            ScanError::IoError(format!(
                "Failed to create output directory '{}': {}",
                self.directory.display(),
                e
            ))
        })?;

        let path = self.next_path();
        self.write_image(&image, &path)?;
        info!("Image saved to: {}", path.display());
        self.saved.push(path.clone());
        Ok(path)
    }

    fn record_file(&mut self, path: &Path) -> Result<PathBuf> {
        if !path.is_file() {
            return Err(ScanError::IoError(format!(
                "Transferred file '{}' does not exist",
                path.display()
            )));
        }
        info!("File transfer mode, file path: {}", path.display());
        self.saved.push(path.to_path_buf());
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testdb::render_page;
    use std::collections::HashSet;
    use tempfile::TempDir;

    #[test]
    fn test_persist_buffer_writes_jpeg() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("scans");
        let mut sink = DirectorySink::new(&out, OutputFormat::Jpeg);

        let path = sink.persist_buffer(&render_page(32, 24, 0x80)).unwrap();

        assert!(out.is_dir());
        assert!(path.starts_with(&out));
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("jpg"));
        let decoded = image::open(&path).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 24));
    }

    #[test]
    fn test_names_unique_within_a_second() {
        let temp = TempDir::new().unwrap();
        let mut sink = DirectorySink::new(temp.path(), OutputFormat::Png).with_prefix("page");
        let page = render_page(8, 8, 0x10);

        let names: HashSet<_> = (0..5)
            .map(|_| sink.persist_buffer(&page).unwrap())
            .collect();

        assert_eq!(names.len(), 5);
        assert_eq!(sink.saved().len(), 5);
        for name in &names {
            let file_name = name.file_name().unwrap().to_string_lossy();
            assert!(file_name.starts_with("page_"));
            assert!(file_name.ends_with(".png"));
        }
    }

    #[test]
    fn test_corrupt_buffer_is_rejected() {
        let temp = TempDir::new().unwrap();
        let mut sink = DirectorySink::new(temp.path(), OutputFormat::Jpeg);

        let result = sink.persist_buffer(&[0xde, 0xad, 0xbe, 0xef]);

        assert!(matches!(result, Err(ScanError::Decode(_))));
        assert!(sink.saved().is_empty());
        assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_record_file_keeps_driver_path() {
        let temp = TempDir::new().unwrap();
        let driver_file = temp.path().join("twain_0001.bmp");
        fs::write(&driver_file, render_page(4, 4, 0)).unwrap();
        let mut sink = DirectorySink::new(temp.path().join("out"), OutputFormat::Jpeg);

        let recorded = sink.record_file(&driver_file).unwrap();

        assert_eq!(recorded, driver_file);
        assert_eq!(sink.saved(), &[driver_file]);
        assert!(!temp.path().join("out").exists());
    }

    #[test]
    fn test_record_missing_file_fails() {
        let temp = TempDir::new().unwrap();
        let mut sink = DirectorySink::new(temp.path(), OutputFormat::Jpeg);
        assert!(sink.record_file(&temp.path().join("missing.bmp")).is_err());
    }
}
