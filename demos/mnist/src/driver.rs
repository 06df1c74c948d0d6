use std::{env, time::Instant};

use anyhow::Context;
use indicatif::ProgressBar;
use vidar::{Matrix, VidarConfig, VidarContext};
use vidar_algorithm::{MultiLogRegParams, confusion_matrix, multi_log_reg, multi_log_reg_predict};
use vidar_datasets::{DataManager, synthetic_blobs};

pub const DATA_DIR_ENV: &str = "VIDAR_MNIST_DIR";
pub const SYNTHETIC_ENV: &str = "VIDAR_MNIST_SYNTHETIC";

const SYNTHETIC_TRAIN: usize = 2000;
const SYNTHETIC_TEST: usize = 500;
const SYNTHETIC_FEATURES: usize = 20;

pub enum Features {
    Pixels(Vec<u8>),
    Values(Vec<f64>),
}

/// One split of a labelled dataset. Labels are 0-based digits.
pub struct Split {
    pub rows: usize,
    pub cols: usize,
    pub features: Features,
    pub labels: Vec<u8>,
}

impl Split {
    fn ingest_features(&self, ctx: &VidarContext) -> anyhow::Result<Matrix> {
        Ok(match &self.features {
            Features::Pixels(px) => ctx.from_u8(px, self.rows, self.cols)?,
            Features::Values(vals) => ctx.from_slice(vals, self.rows, self.cols)?,
        })
    }

    // labels are shifted to 1-based classes
    fn ingest_labels(&self, ctx: &VidarContext) -> anyhow::Result<Matrix> {
        Ok(ctx.from_u8(&self.labels, self.rows, 1)? + 1.0)
    }
}

pub struct Digits {
    pub train: Split,
    pub test: Split,
}

fn load_mnist(manager: &DataManager) -> anyhow::Result<Digits> {
    let (train_x, train_y) = (manager.get_train_data()?, manager.get_train_labels()?);
    let (test_x, test_y) = (manager.get_test_data()?, manager.get_test_labels()?);

    Ok(Digits {
        train: Split {
            rows: train_x.rows,
            cols: train_x.cols,
            features: Features::Pixels(train_x.data),
            labels: train_y.data,
        },
        test: Split {
            rows: test_x.rows,
            cols: test_x.cols,
            features: Features::Pixels(test_x.data),
            labels: test_y.data,
        },
    })
}

/// Ten separable blobs standing in for the digits.
pub fn synthetic_digits(seed: u64) -> Digits {
    let blobs = synthetic_blobs(SYNTHETIC_TRAIN + SYNTHETIC_TEST, SYNTHETIC_FEATURES, 10, seed);
    let split_at = SYNTHETIC_TRAIN * SYNTHETIC_FEATURES;
    let labels = blobs
        .labels
        .iter()
        .map(|l| (*l as u8).saturating_sub(1))
        .collect::<Vec<_>>();

    Digits {
        train: Split {
            rows: SYNTHETIC_TRAIN,
            cols: SYNTHETIC_FEATURES,
            features: Features::Values(blobs.features[..split_at].to_vec()),
            labels: labels[..SYNTHETIC_TRAIN].to_vec(),
        },
        test: Split {
            rows: SYNTHETIC_TEST,
            cols: SYNTHETIC_FEATURES,
            features: Features::Values(blobs.features[split_at..].to_vec()),
            labels: labels[SYNTHETIC_TRAIN..].to_vec(),
        },
    }
}

fn synthetic_requested() -> bool {
    matches!(
        env::var(SYNTHETIC_ENV).as_deref(),
        Ok("1") | Ok("true") | Ok("yes")
    )
}

/// Trains on the training split and returns the test accuracy in percent.
pub fn train_and_score(
    ctx: &VidarContext,
    digits: &Digits,
    bar: &ProgressBar,
) -> anyhow::Result<f64> {
    bar.set_message("training");
    let x = digits.train.ingest_features(ctx)?;
    let y = digits.train.ingest_labels(ctx)?;
    let params = MultiLogRegParams::default()
        .with_tol(1e-4)
        .with_verbose(false);
    let bias = multi_log_reg(ctx, &x, &y, &params)?;
    bar.inc(1);

    bar.set_message("predicting");
    let xt = digits.test.ingest_features(ctx)?;
    let yt = digits.test.ingest_labels(ctx)?;
    let prediction = multi_log_reg_predict(ctx, &xt, &bias, &yt, false)?;
    let (_, _, accuracy) = prediction.compute()?;
    bar.inc(1);

    if log::log_enabled!(log::Level::Debug) {
        let confusion = confusion_matrix(&prediction.predicted_y, &yt)?;
        log::debug!("Confusion matrix (predicted x actual): {confusion}");
    }

    Ok(accuracy)
}

pub fn run() -> anyhow::Result<f64> {
    let data_dir = env::var(DATA_DIR_ENV).unwrap_or_else(|_| "./data".to_string());
    let manager = DataManager::new(&data_dir);

    let bar = ProgressBar::new(3);
    bar.set_message("loading data");
    let digits = match manager.check_files() {
        Ok(()) => load_mnist(&manager)?,
        Err(err) if synthetic_requested() => {
            log::warn!("{err}, falling back to synthetic digits");
            synthetic_digits(0)
        }
        Err(err) => {
            return Err(err).with_context(|| {
                format!(
                    "MNIST IDX files are required in `{data_dir}` (set `{DATA_DIR_ENV}`, or `{SYNTHETIC_ENV}=1` for synthetic data)"
                )
            });
        }
    };
    bar.inc(1);

    println!("Training set size: {}", digits.train.rows);
    println!("Test set size: {}", digits.test.rows);

    let start_time = Instant::now();
    let config = VidarConfig::from_env()?;
    let accuracy = VidarContext::scope_with(config, |ctx| train_and_score(ctx, &digits, &bar))?;
    bar.finish_and_clear();

    log::info!("Finished in {:.2?}", start_time.elapsed());
    Ok(accuracy)
}
