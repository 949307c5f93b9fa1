use crate::error::{AlignError, AlignResult};
use image::RgbImage;
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "bmp", "webp", "tif", "tiff"];

/// Decoded color image together with the identifier it was loaded from.
#[derive(Debug, Clone)]
pub struct SourceImage {
    pub id: String,
    pub pixels: RgbImage,
}

impl SourceImage {
    pub fn new(id: impl Into<String>, pixels: RgbImage) -> Self {
        Self {
            id: id.into(),
            pixels,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }
}

/// Where an input image comes from.
#[derive(Debug, Clone)]
pub enum ImageInput {
    Path(PathBuf),
    Bytes { id: String, data: Vec<u8> },
}

impl ImageInput {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        ImageInput::Path(path.into())
    }

    pub fn from_bytes(id: impl Into<String>, data: Vec<u8>) -> Self {
        ImageInput::Bytes {
            id: id.into(),
            data,
        }
    }

    pub fn id(&self) -> String {
        match self {
            ImageInput::Path(path) => path.to_string_lossy().to_string(),
            ImageInput::Bytes { id, .. } => id.clone(),
        }
    }

    /// File name component used for naming outputs and parsing dates.
    pub fn file_name(&self) -> String {
        match self {
            ImageInput::Path(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| self.id()),
            ImageInput::Bytes { id, .. } => Path::new(id)
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| id.clone()),
        }
    }

    /// Decode into a color image. Every failure is reported as
    /// `ImageUnreadable`.
    pub fn load(&self) -> AlignResult<SourceImage> {
        let decoded = match self {
            ImageInput::Path(path) => {
                if !path.exists() {
                    return Err(AlignError::ImageUnreadable(format!(
                        "Image file does not exist: {}",
                        path.display()
                    )));
                }
                image::open(path)
            }
            ImageInput::Bytes { data, .. } => image::load_from_memory(data),
        }
        .map_err(|e| AlignError::ImageUnreadable(format!("{}: {}", self.id(), e)))?;

        let pixels = decoded.to_rgb8();
        validate_image_size(&pixels)?;
        Ok(SourceImage::new(self.id(), pixels))
    }
}

/// Validate that image has reasonable dimensions
pub fn validate_image_size(image: &RgbImage) -> AlignResult<()> {
    validate_image_size_with_limits(image, 10, 10000)
}

/// Validate image size with custom limits
pub fn validate_image_size_with_limits(
    image: &RgbImage,
    min_size: u32,
    max_size: u32,
) -> AlignResult<()> {
    let (width, height) = image.dimensions();

    if width < min_size || height < min_size {
        return Err(AlignError::ImageUnreadable(format!(
            "Image too small: {}x{}, minimum: {}x{}",
            width, height, min_size, min_size
        )));
    }

    if width > max_size || height > max_size {
        return Err(AlignError::ImageUnreadable(format!(
            "Image too large: {}x{}, maximum: {}x{}",
            width, height, max_size, max_size
        )));
    }

    Ok(())
}

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Expand directories into the image files they contain (sorted by name);
/// plain file arguments are kept as given.
pub fn collect_inputs(paths: &[PathBuf]) -> anyhow::Result<Vec<ImageInput>> {
    let mut inputs = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut files: Vec<PathBuf> = std::fs::read_dir(path)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && is_image_file(p))
                .collect();
            files.sort();
            inputs.extend(files.into_iter().map(ImageInput::Path));
        } else {
            inputs.push(ImageInput::Path(path.clone()));
        }
    }
    Ok(inputs)
}
