use super::genre_table;
use crate::dataset::processing::*;
use crate::error::PipelineError;
use anyhow::Result;
use polars::prelude::*;

fn values(df: &DataFrame, name: &str) -> Vec<f64> {
    df.column(name)
        .unwrap()
        .as_materialized_series()
        .cast(&DataType::Float64)
        .unwrap()
        .f64()
        .unwrap()
        .into_no_null_iter()
        .collect()
}

#[test]
fn test_zscore_centres_features() -> Result<()> {
    let df = df!(
        "x" => &[1.0, 2.0, 3.0, 4.0, 5.0],
        "label" => &["a", "b", "a", "b", "a"]
    )?;
    let out = normalize(&df, "label")?;
    let x = values(&out, "x");

    let mean: f64 = x.iter().sum::<f64>() / x.len() as f64;
    assert!(mean.abs() < 1e-12);
    let var = x.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (x.len() - 1) as f64;
    assert!((var - 1.0).abs() < 1e-12);
    Ok(())
}

#[test]
fn test_min_max_range() -> Result<()> {
    let df = df!(
        "x" => &[10.0, 20.0, 15.0],
        "label" => &["a", "b", "a"]
    )?;
    let (out, state) = normalize_with_state(&df, "label", NormalisationMethod::MinMax)?;
    assert_eq!(values(&out, "x"), vec![0.0, 1.0, 0.5]);
    assert_eq!(
        state.scaling_of("x"),
        Some(Scaling::Affine {
            offset: 10.0,
            scale: 10.0
        })
    );
    Ok(())
}

#[test]
fn test_label_column_is_never_scaled() -> Result<()> {
    let df = df!(
        "x" => &[1.0, 2.0, 3.0],
        "label" => &[5i64, 6, 7]
    )?;
    let out = normalize(&df, "label")?;
    assert!(
        out.column("label")?
            .as_materialized_series()
            .equals(df.column("label")?.as_materialized_series())
    );
    Ok(())
}

#[test]
fn test_constant_column_passes_through() -> Result<()> {
    let df = df!(
        "flat" => &[3.5, 3.5, 3.5, 3.5],
        "x" => &[1.0, 2.0, 3.0, 4.0],
        "label" => &["a", "b", "a", "b"]
    )?;
    for method in [NormalisationMethod::ZScore, NormalisationMethod::MinMax] {
        let (out, state) = normalize_with_state(&df, "label", method)?;
        let flat = values(&out, "flat");
        assert_eq!(flat, vec![3.5; 4]);
        assert!(flat.iter().all(|v| v.is_finite()));
        assert_eq!(state.scaling_of("flat"), Some(Scaling::Passthrough));
    }
    Ok(())
}

#[test]
fn test_normalize_is_deterministic() -> Result<()> {
    let df = genre_table(100);
    let a = normalize(&df, "genre")?;
    let b = normalize(&df, "genre")?;
    for name in ["row_id", "tempo", "energy"] {
        let bits_a: Vec<u64> = values(&a, name).iter().map(|v| v.to_bits()).collect();
        let bits_b: Vec<u64> = values(&b, name).iter().map(|v| v.to_bits()).collect();
        assert_eq!(bits_a, bits_b, "column {name} differs between runs");
    }
    Ok(())
}

#[test]
fn test_normalize_does_not_mutate_input() -> Result<()> {
    let df = genre_table(10);
    let before = df.clone();
    let _ = normalize(&df, "genre")?;
    assert!(df.equals(&before));
    Ok(())
}

#[test]
fn test_normalize_missing_label_is_schema_error() {
    let df = genre_table(4);
    let err = normalize(&df, "mood").unwrap_err();
    assert!(matches!(err, PipelineError::Schema(_)), "got {err:?}");
}

#[test]
fn test_normalize_rejects_text_feature() -> Result<()> {
    let df = df!(
        "artist" => &["x", "y"],
        "label" => &["a", "b"]
    )?;
    let err = normalize(&df, "label").unwrap_err();
    assert!(matches!(err, PipelineError::Schema(_)));
    Ok(())
}

#[test]
fn test_state_applies_to_new_data() -> Result<()> {
    let train = df!("x" => &[0.0, 10.0], "label" => &["a", "b"])?;
    let (_, state) = normalize_with_state(&train, "label", NormalisationMethod::MinMax)?;

    let unseen = df!("x" => &[5.0, 20.0])?;
    let scaled = state.apply(&unseen)?;
    assert_eq!(values(&scaled, "x"), vec![0.5, 2.0]);

    let missing = df!("y" => &[1.0])?;
    assert!(matches!(state.apply(&missing), Err(PipelineError::Schema(_))));
    Ok(())
}

#[test]
fn test_encode_first_occurrence_order() -> Result<()> {
    let df = df!(
        "x" => &[1.0, 2.0, 3.0, 4.0, 5.0],
        "genre" => &["rock", "jazz", "rock", "blues", "jazz"]
    )?;
    let (out, encoding) = encode_labels_with_mapping(&df, "genre")?;

    assert_eq!(encoding.classes().to_vec(), vec!["rock", "jazz", "blues"]);
    let codes: Vec<u32> = out.column("genre")?.as_materialized_series().u32()?.into_no_null_iter().collect();
    assert_eq!(codes, vec![0, 1, 0, 2, 1]);
    assert_eq!(encoding.name_of(2), Some("blues"));
    assert_eq!(encoding.code_of("jazz"), Some(1));
    assert_eq!(encoding.code_of("metal"), None);
    Ok(())
}

#[test]
fn test_encode_is_idempotent() -> Result<()> {
    let df = genre_table(40);
    let once = encode_labels(&df, "genre")?;
    let twice = encode_labels(&once, "genre")?;
    assert!(
        once.column("genre")?
            .as_materialized_series()
            .equals(twice.column("genre")?.as_materialized_series())
    );
    Ok(())
}

#[test]
fn test_encode_codes_are_unique_per_label() -> Result<()> {
    let df = genre_table(40);
    let (out, encoding) = encode_labels_with_mapping(&df, "genre")?;
    assert_eq!(encoding.len(), 4);

    let originals: Vec<String> = df
        .column("genre")?
        .as_materialized_series()
        .str()?
        .into_no_null_iter()
        .map(str::to_owned)
        .collect();
    let codes: Vec<u32> = out.column("genre")?.as_materialized_series().u32()?.into_no_null_iter().collect();
    for (name, code) in originals.iter().zip(&codes) {
        assert_eq!(encoding.code_of(name), Some(*code));
        assert_eq!(encoding.name_of(*code), Some(name.as_str()));
    }
    Ok(())
}

#[test]
fn test_encode_errors() -> Result<()> {
    let df = genre_table(4);
    assert!(matches!(
        encode_labels(&df, "mood"),
        Err(PipelineError::Schema(_))
    ));

    let empty = df!("x" => Vec::<f64>::new(), "genre" => Vec::<String>::new())?;
    assert!(matches!(
        encode_labels(&empty, "genre"),
        Err(PipelineError::Schema(_))
    ));

    let with_null = df!("x" => &[1.0, 2.0], "genre" => &[Some("rock"), None])?;
    assert!(matches!(
        encode_labels(&with_null, "genre"),
        Err(PipelineError::Schema(_))
    ));
    Ok(())
}

#[test]
fn test_encoding_survives_json() -> Result<()> {
    let encoding = LabelEncoding::fit(["pop", "rock", "pop"]);
    let json = serde_json::to_string(&encoding)?;
    let back: LabelEncoding = serde_json::from_str(&json)?;
    assert_eq!(back, encoding);
    assert!(LabelEncoding::from_classes(vec!["a".into(), "a".into()]).is_err());
    Ok(())
}
