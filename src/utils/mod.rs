pub mod image_io;
pub mod ordering;
pub mod output;

pub use image_io::{collect_inputs, is_image_file, validate_image_size, ImageInput, SourceImage};
pub use ordering::{parse_date_from_filename, sort_by_date, DatePattern, SortOrder};
pub use output::{OutputWriter, WrittenImage};
