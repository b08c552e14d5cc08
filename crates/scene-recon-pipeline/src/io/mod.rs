//! Filesystem inputs: image discovery and loading.

mod images;

pub use images::{ImageLoadOptions, list_images, load_image, load_views, prepare_image};
