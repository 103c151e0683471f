use std::path::{Path, PathBuf};

/// Directory, under the output root, that all images are flattened into.
pub const ASSET_DIR: &str = "images";

/// Everything a run needs to know about where things live.
///
/// Built once before the pipeline starts and only read afterwards.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Root of the unpacked package
    pub package_root: PathBuf,
    /// Directory the linked documents are written to
    pub output_dir: PathBuf,
    /// Scratch space for pre-pass markup and raw converter output
    pub work_dir: PathBuf,
    /// Copy images into the asset directory
    pub copy_images: bool,
}

impl RunContext {
    pub fn new(package_root: &Path, output_dir: &Path, work_dir: &Path) -> Self {
        Self {
            package_root: package_root.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            work_dir: work_dir.to_path_buf(),
            copy_images: true,
        }
    }

    pub fn with_images(mut self, copy_images: bool) -> Self {
        self.copy_images = copy_images;
        self
    }

    pub fn asset_dir(&self) -> PathBuf {
        self.output_dir.join(ASSET_DIR)
    }
}
