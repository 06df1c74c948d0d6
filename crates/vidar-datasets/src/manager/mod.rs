use std::{
    fs::File,
    io::Read,
    path::{Path, PathBuf},
    sync::Arc,
};

use ::mnist::MnistBuilder;
use parking_lot::Mutex;

use crate::error::DatasetError;

pub const IMAGE_SIZE: usize = 28 * 28;
pub const TRAIN_LEN: usize = 60_000;
pub const TEST_LEN: usize = 10_000;

const TRAIN_IMAGES: &str = "train-images-idx3-ubyte";
const TRAIN_LABELS: &str = "train-labels-idx1-ubyte";
const TEST_IMAGES: &str = "t10k-images-idx3-ubyte";
const TEST_LABELS: &str = "t10k-labels-idx1-ubyte";

// IDX headers: magic + dims
const IMAGE_HEADER: u64 = 16;
const LABEL_HEADER: u64 = 8;
// big-endian, u8 data with 3 and 1 dimensions
const IMAGE_MAGIC: u32 = 0x0000_0803;
const LABEL_MAGIC: u32 = 0x0000_0801;

/// Row-major byte matrix as stored in the IDX files.
#[derive(Debug, Clone, PartialEq)]
pub struct ByteMatrix {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<u8>,
}

struct MnistData {
    train_images: Vec<u8>,
    train_labels: Vec<u8>,
    test_images: Vec<u8>,
    test_labels: Vec<u8>,
}

/// Access to the MNIST digits in `base_path`. The IDX files are read on
/// first use and cached for the lifetime of the manager.
pub struct DataManager {
    base_path: PathBuf,
    data: Mutex<Option<Arc<MnistData>>>,
}

impl DataManager {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            data: Mutex::new(None),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Checks that all four IDX files exist, carry the expected magic number
    /// and are large enough, reading only their first bytes.
    pub fn check_files(&self) -> Result<(), DatasetError> {
        let expected = [
            (TRAIN_IMAGES, IMAGE_MAGIC, IMAGE_HEADER + (TRAIN_LEN * IMAGE_SIZE) as u64),
            (TRAIN_LABELS, LABEL_MAGIC, LABEL_HEADER + TRAIN_LEN as u64),
            (TEST_IMAGES, IMAGE_MAGIC, IMAGE_HEADER + (TEST_LEN * IMAGE_SIZE) as u64),
            (TEST_LABELS, LABEL_MAGIC, LABEL_HEADER + TEST_LEN as u64),
        ];

        for (name, magic, min_len) in expected {
            let path = self.base_path.join(name);
            if !path.is_file() {
                return Err(DatasetError::MissingFile(path));
            }
            let len = std::fs::metadata(&path)?.len();
            if len < 4 {
                return Err(DatasetError::Truncated(path, len, min_len));
            }

            let mut header = [0u8; 4];
            File::open(&path)?.read_exact(&mut header)?;
            let found = u32::from_be_bytes(header);
            if found != magic {
                return Err(DatasetError::BadMagic(path, found, magic));
            }

            if len < min_len {
                return Err(DatasetError::Truncated(path, len, min_len));
            }
        }

        Ok(())
    }

    fn load(&self) -> Result<Arc<MnistData>, DatasetError> {
        let mut cached = self.data.lock();
        if let Some(data) = cached.as_ref() {
            return Ok(data.clone());
        }

        self.check_files()?;
        let base_path = self
            .base_path
            .to_str()
            .ok_or_else(|| DatasetError::InvalidPath(self.base_path.clone()))?;

        log::debug!("Loading MNIST from `{base_path}`");
        let mnist = MnistBuilder::new()
            .base_path(base_path)
            .training_set_length(TRAIN_LEN as u32)
            .validation_set_length(0)
            .test_set_length(TEST_LEN as u32)
            .finalize();

        let data = Arc::new(MnistData {
            train_images: mnist.trn_img,
            train_labels: mnist.trn_lbl,
            test_images: mnist.tst_img,
            test_labels: mnist.tst_lbl,
        });
        log::debug!(
            "Loaded {} training and {} test images",
            data.train_labels.len(),
            data.test_labels.len()
        );

        *cached = Some(data.clone());
        Ok(data)
    }

    /// 60000 x 784 training pixels.
    pub fn get_train_data(&self) -> Result<ByteMatrix, DatasetError> {
        let data = self.load()?;
        Ok(ByteMatrix {
            rows: data.train_labels.len(),
            cols: IMAGE_SIZE,
            data: data.train_images.clone(),
        })
    }

    /// 60000 x 1 training digits, 0 to 9.
    pub fn get_train_labels(&self) -> Result<ByteMatrix, DatasetError> {
        let data = self.load()?;
        Ok(ByteMatrix {
            rows: data.train_labels.len(),
            cols: 1,
            data: data.train_labels.clone(),
        })
    }

    /// 10000 x 784 test pixels.
    pub fn get_test_data(&self) -> Result<ByteMatrix, DatasetError> {
        let data = self.load()?;
        Ok(ByteMatrix {
            rows: data.test_labels.len(),
            cols: IMAGE_SIZE,
            data: data.test_images.clone(),
        })
    }

    pub fn get_test_labels(&self) -> Result<ByteMatrix, DatasetError> {
        let data = self.load()?;
        Ok(ByteMatrix {
            rows: data.test_labels.len(),
            cols: 1,
            data: data.test_labels.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn missing_files_are_errors() {
        let dir = std::env::temp_dir().join("vidar-datasets-missing");
        let manager = DataManager::new(&dir);
        match manager.get_train_data() {
            Err(DatasetError::MissingFile(path)) => {
                assert_eq!(path, dir.join(TRAIN_IMAGES))
            }
            other => panic!("expected a missing file error, got {other:?}"),
        }
    }

    #[test]
    fn truncated_files_are_errors() {
        let dir = std::env::temp_dir().join(format!("vidar-datasets-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        for (name, magic) in [
            (TRAIN_IMAGES, IMAGE_MAGIC),
            (TRAIN_LABELS, LABEL_MAGIC),
            (TEST_IMAGES, IMAGE_MAGIC),
            (TEST_LABELS, LABEL_MAGIC),
        ] {
            let mut bytes = magic.to_be_bytes().to_vec();
            bytes.resize(32, 0);
            fs::write(dir.join(name), bytes).unwrap();
        }

        let manager = DataManager::new(&dir);
        assert!(matches!(
            manager.check_files(),
            Err(DatasetError::Truncated(_, 32, _))
        ));
        assert!(manager.get_test_labels().is_err());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn bad_magic_numbers_are_errors() {
        let dir = std::env::temp_dir().join(format!("vidar-datasets-magic-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        // labels magic where images are expected
        for name in [TRAIN_IMAGES, TRAIN_LABELS, TEST_IMAGES, TEST_LABELS] {
            let mut bytes = LABEL_MAGIC.to_be_bytes().to_vec();
            bytes.resize(32, 0);
            fs::write(dir.join(name), bytes).unwrap();
        }

        let manager = DataManager::new(&dir);
        match manager.check_files() {
            Err(DatasetError::BadMagic(path, found, expected)) => {
                assert_eq!(path, dir.join(TRAIN_IMAGES));
                assert_eq!((found, expected), (LABEL_MAGIC, IMAGE_MAGIC));
            }
            other => panic!("expected a bad magic error, got {other:?}"),
        }
        assert!(matches!(
            manager.get_train_data(),
            Err(DatasetError::BadMagic(..))
        ));

        fs::remove_dir_all(&dir).unwrap();
    }
}
