use super::processing::require_column;
use crate::config::validate_test_rate;
use crate::error::{PipelineError, Result};
use polars::prelude::*;
use rand::SeedableRng as _;
use rand::seq::SliceRandom as _;
use rand_chacha::ChaCha8Rng;

/// Train/test partitions with the label column held separately.
/// Row `i` of a data frame corresponds to element `i` of its label series.
#[derive(Debug, Clone)]
pub struct SplitDataset {
    pub train_data: DataFrame,
    pub test_data: DataFrame,
    pub train_label: Series,
    pub test_label: Series,
}

impl SplitDataset {
    pub fn train_rows(&self) -> usize {
        self.train_data.height()
    }

    pub fn test_rows(&self) -> usize {
        self.test_data.height()
    }

    /// Feature column names, in table order.
    pub fn feature_columns(&self) -> Vec<String> {
        self.train_data
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect()
    }
}

/// Number of test rows for `total` rows: `round(total * test_rate)`, kept within
/// `[1, total - 1]` so neither partition is empty.
pub fn test_row_count(total: usize, test_rate: f64) -> usize {
    let wanted = (total as f64 * test_rate).round() as usize;
    wanted.clamp(1, total.saturating_sub(1).max(1))
}

/// Row order used for the split: identity, or a ChaCha8 permutation of it.
pub fn row_order(total: usize, shuffle: bool, seed: u64) -> Vec<usize> {
    let mut order: Vec<usize> = (0..total).collect();
    if shuffle {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        order.shuffle(&mut rng);
    }
    order
}

/// Splits `df` into train and test partitions and pulls the label column out
/// of each.
///
/// # Errors
///
/// [`PipelineError::Config`] if `test_rate` is not in `(0, 1)`;
/// [`PipelineError::Schema`] if the label column is missing or there are fewer
/// than two rows.
pub fn split(
    df: &DataFrame,
    label_column: &str,
    test_rate: f64,
    shuffle: bool,
    seed: u64,
) -> Result<SplitDataset> {
    validate_test_rate(test_rate)?;
    require_column(df, label_column)?;

    let total = df.height();
    if total < 2 {
        return Err(PipelineError::Schema(format!(
            "cannot split a table with {total} row(s) into train and test partitions"
        )));
    }

    let n_test = test_row_count(total, test_rate);
    let n_train = total - n_test;
    let order = row_order(total, shuffle, seed);
    let (train_idx, test_idx) = order.split_at(n_train);

    let train = take_rows(df, train_idx)?;
    let test = take_rows(df, test_idx)?;

    let (train_data, train_label) = separate_label(&train, label_column)?;
    let (test_data, test_label) = separate_label(&test, label_column)?;

    tracing::debug!(
        total,
        train = n_train,
        test = n_test,
        shuffle,
        "Split feature table"
    );

    Ok(SplitDataset {
        train_data,
        test_data,
        train_label,
        test_label,
    })
}

fn take_rows(df: &DataFrame, rows: &[usize]) -> Result<DataFrame> {
    let idx = rows
        .iter()
        .map(|&r| {
            IdxSize::try_from(r)
                .map_err(|_| PipelineError::Schema(format!("row index {r} out of range")))
        })
        .collect::<Result<Vec<IdxSize>>>()?;
    let idx = IdxCa::from_vec("idx".into(), idx);
    Ok(df.take(&idx)?)
}

/// Removes `label_column` from `df`, returning the remaining table and the label.
pub fn separate_label(df: &DataFrame, label_column: &str) -> Result<(DataFrame, Series)> {
    require_column(df, label_column)?;
    let label = df.column(label_column)?.as_materialized_series().clone();
    let data = df.drop(label_column)?;
    Ok((data, label))
}

/// Puts the label back as the last column of `data`.
pub fn combine_label(data: &DataFrame, label: &Series) -> Result<DataFrame> {
    if data.height() != label.len() {
        return Err(PipelineError::Schema(format!(
            "label '{}' has {} rows but the data has {}",
            label.name(),
            label.len(),
            data.height()
        )));
    }
    let mut out = data.clone();
    out.with_column(label.clone())?;
    Ok(out)
}
