//! Canonical-schema data cleaning.
//!
//! The cleaning order matters: later steps assume earlier ones ran
//! (imputation before outlier clipping, mapping before everything).

use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{info, warn};

use super::columns::{ColumnMapping, ColumnTable};
use super::{field, CleanTable, RawTable};
use crate::config::PipelineConfig;
use crate::error::PipelineError;

/// Canonical numeric columns of the consumption schema.
const CONSUMPTION_NUMERIC: [&str; 5] = [
    field::BATTERY_CAPACITY,
    field::CURRENT_SOC,
    field::AVG_SPEED,
    field::TEMPERATURE,
    field::RANGE,
];

/// Canonical categorical columns of the consumption schema.
const CONSUMPTION_CATEGORICAL: [&str; 3] =
    [field::TERRAIN, field::AC_USAGE, field::DRIVING_STYLE];

const STATIONS_NUMERIC: [&str; 2] = [field::LATITUDE, field::LONGITUDE];
const STATIONS_CATEGORICAL: [&str; 3] = [field::STATION_NAME, field::CITY, field::STATE];

/// Clean a raw trip/consumption dataset into the canonical schema.
///
/// Steps, in order: column mapping and projection, mandatory-field check,
/// exact-duplicate drop, median/mode imputation, category normalization,
/// target outlier clip, and range validation. The output has no nulls and
/// satisfies the SoC/temperature invariants.
pub fn clean_consumption(
    raw: &RawTable,
    table: &ColumnTable,
    cfg: &PipelineConfig,
) -> Result<CleanTable, PipelineError> {
    let mapping = table.map_columns(&raw.headers);
    if !mapping.contains(field::RANGE) {
        return Err(PipelineError::MissingTarget);
    }

    let projected = project(raw, &mapping);
    let projected = drop_duplicate_rows(projected);
    let n_rows = projected.values().next().map_or(0, |c| c.len());

    let mut out = CleanTable {
        numeric: BTreeMap::new(),
        categorical: BTreeMap::new(),
        n_rows,
    };

    for name in CONSUMPTION_NUMERIC {
        if let Some(cells) = projected.get(name) {
            out.numeric
                .insert(name.to_string(), impute_numeric(name, cells));
        }
    }
    for name in CONSUMPTION_CATEGORICAL {
        if let Some(cells) = projected.get(name) {
            let mut col = impute_categorical(cells);
            for v in &mut col {
                *v = title_case(v);
            }
            out.categorical.insert(name.to_string(), col);
        }
    }

    clip_target_outliers(&mut out, cfg);

    // Range validation on SoC and temperature, where those columns exist.
    if let Some(soc) = out.numeric_column(field::CURRENT_SOC) {
        let mask: Vec<bool> = soc
            .iter()
            .map(|&v| v >= cfg.soc_min_pct && v <= cfg.soc_max_pct)
            .collect();
        out.retain_rows(&mask);
    }
    if let Some(temp) = out.numeric_column(field::TEMPERATURE) {
        let mask: Vec<bool> = temp
            .iter()
            .map(|&v| v >= cfg.temperature_min_c && v <= cfg.temperature_max_c)
            .collect();
        out.retain_rows(&mask);
    }

    info!(
        rows_in = raw.n_rows(),
        rows_out = out.n_rows,
        mapped_columns = mapping.len(),
        "consumption dataset cleaned"
    );
    Ok(out)
}

/// Clean a raw charging-stations dataset: mapping, essential-field check,
/// coordinate dedup and validation, plus synthesized bookkeeping columns.
pub fn clean_stations(
    raw: &RawTable,
    table: &ColumnTable,
    cfg: &PipelineConfig,
) -> Result<CleanTable, PipelineError> {
    let _ = cfg;
    let mapping = table.map_columns(&raw.headers);

    let essential = [field::STATION_NAME, field::LATITUDE, field::LONGITUDE];
    let missing: Vec<String> = essential
        .iter()
        .filter(|f| !mapping.contains(f))
        .map(|f| f.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(PipelineError::MissingEssentialFields(missing));
    }

    let projected = project(raw, &mapping);
    let projected = drop_duplicate_coordinates(projected);
    let n_rows = projected.values().next().map_or(0, |c| c.len());

    let mut out = CleanTable {
        numeric: BTreeMap::new(),
        categorical: BTreeMap::new(),
        n_rows,
    };

    for name in STATIONS_NUMERIC {
        if let Some(cells) = projected.get(name) {
            out.numeric
                .insert(name.to_string(), impute_numeric(name, cells));
        }
    }
    for name in STATIONS_CATEGORICAL {
        if let Some(cells) = projected.get(name) {
            out.categorical
                .insert(name.to_string(), impute_categorical(cells));
        }
    }

    // Coordinate validation.
    let lat = out.numeric[field::LATITUDE].clone();
    let lon = out.numeric[field::LONGITUDE].clone();
    let mask: Vec<bool> = lat
        .iter()
        .zip(lon.iter())
        .map(|(&la, &lo)| (-90.0..=90.0).contains(&la) && (-180.0..=180.0).contains(&lo))
        .collect();
    out.retain_rows(&mask);

    // Synthesized bookkeeping columns for downstream consumers.
    let n = out.n_rows;
    out.numeric
        .insert(field::HEALTH_SCORE.to_string(), vec![100.0; n]);
    out.categorical
        .insert(field::IS_VERIFIED.to_string(), vec!["false".to_string(); n]);
    out.categorical
        .insert(field::SOURCE.to_string(), vec!["dataset".to_string(); n]);
    out.categorical.insert(
        field::STATION_ID.to_string(),
        (0..n).map(|i| format!("ST{:06}", i)).collect(),
    );

    info!(rows_in = raw.n_rows(), rows_out = out.n_rows, "stations dataset cleaned");
    Ok(out)
}

/// Project mapped raw columns into canonical names. Unmapped canonical
/// fields stay absent at this stage.
fn project(raw: &RawTable, mapping: &ColumnMapping) -> BTreeMap<String, Vec<String>> {
    let mut projected = BTreeMap::new();
    for (canonical, raw_name) in mapping.iter() {
        if let Some(cells) = raw.column(raw_name) {
            projected.insert(
                canonical.to_string(),
                cells.into_iter().map(|c| c.to_string()).collect(),
            );
        }
    }
    projected
}

/// Drop exact-duplicate rows, keeping first occurrences.
fn drop_duplicate_rows(projected: BTreeMap<String, Vec<String>>) -> BTreeMap<String, Vec<String>> {
    let n_rows = projected.values().next().map_or(0, |c| c.len());
    let mut seen = HashSet::new();
    let mask: Vec<bool> = (0..n_rows)
        .map(|i| {
            let key: Vec<&str> = projected.values().map(|col| col[i].as_str()).collect();
            seen.insert(key.join("\u{1f}"))
        })
        .collect();
    apply_mask(projected, &mask)
}

/// Drop rows whose (latitude, longitude) pair was already seen.
fn drop_duplicate_coordinates(
    projected: BTreeMap<String, Vec<String>>,
) -> BTreeMap<String, Vec<String>> {
    let n_rows = projected.values().next().map_or(0, |c| c.len());
    let lat = projected.get(field::LATITUDE).cloned().unwrap_or_default();
    let lon = projected.get(field::LONGITUDE).cloned().unwrap_or_default();
    let mut seen = HashSet::new();
    let mask: Vec<bool> = (0..n_rows)
        .map(|i| seen.insert(format!("{}\u{1f}{}", lat[i], lon[i])))
        .collect();
    apply_mask(projected, &mask)
}

fn apply_mask(
    projected: BTreeMap<String, Vec<String>>,
    mask: &[bool],
) -> BTreeMap<String, Vec<String>> {
    projected
        .into_iter()
        .map(|(name, col)| {
            let kept = col
                .into_iter()
                .zip(mask.iter())
                .filter_map(|(v, &keep)| keep.then_some(v))
                .collect();
            (name, kept)
        })
        .collect()
}

/// Parse a text column as f64, filling unparsable/empty cells with the
/// column median. An entirely unparsable column becomes all zeros.
fn impute_numeric(name: &str, cells: &[String]) -> Vec<f64> {
    let parsed: Vec<Option<f64>> = cells.iter().map(|c| c.trim().parse::<f64>().ok()).collect();
    let mut present: Vec<f64> = parsed.iter().filter_map(|v| *v).collect();

    let fill = if present.is_empty() {
        warn!(column = name, "numeric column has no parsable values; filling with 0");
        0.0
    } else {
        median(&mut present)
    };

    parsed.into_iter().map(|v| v.unwrap_or(fill)).collect()
}

/// Fill empty categorical cells with the column mode, or "Unknown" when the
/// column has no values at all. Ties resolve to the lexicographically
/// smallest value so imputation stays deterministic.
fn impute_categorical(cells: &[String]) -> Vec<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for c in cells.iter().filter(|c| !c.trim().is_empty()) {
        *counts.entry(c.as_str()).or_insert(0) += 1;
    }

    let fill = counts
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(v, _)| v.to_string())
        .unwrap_or_else(|| "Unknown".to_string());

    cells
        .iter()
        .map(|c| {
            if c.trim().is_empty() {
                fill.clone()
            } else {
                c.clone()
            }
        })
        .collect()
}

/// Tail quantiles computed over fewer rows than this say nothing about
/// outliers, so the clip is skipped entirely.
const MIN_ROWS_FOR_OUTLIER_CLIP: usize = 20;

/// Keep only rows whose target falls within the configured quantile bounds,
/// computed post-imputation. Tables below [`MIN_ROWS_FOR_OUTLIER_CLIP`] rows
/// are left untouched.
fn clip_target_outliers(out: &mut CleanTable, cfg: &PipelineConfig) {
    let Some(target) = out.numeric_column(field::RANGE) else {
        return;
    };
    if target.len() < MIN_ROWS_FOR_OUTLIER_CLIP {
        return;
    }
    let lo = quantile(target, cfg.outlier_lower_quantile);
    let hi = quantile(target, cfg.outlier_upper_quantile);
    let mask: Vec<bool> = target.iter().map(|&v| v >= lo && v <= hi).collect();
    let dropped = mask.iter().filter(|&&k| !k).count();
    out.retain_rows(&mask);
    if dropped > 0 {
        info!(dropped, lo, hi, "clipped target outliers");
    }
}

pub(crate) fn median(values: &mut [f64]) -> f64 {
    values.sort_by(f64::total_cmp);
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}

/// Linear-interpolation quantile over an unsorted slice.
pub(crate) fn quantile(values: &[f64], q: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
    }
}

/// Title-case a categorical value the way the cleaning stage has always
/// normalized `Terrain`/`AC_Usage`/`Driving_Style` ("hilly" -> "Hilly",
/// "ECO MODE" -> "Eco Mode").
pub(crate) fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for ch in s.chars() {
        if ch.is_alphanumeric() {
            if at_word_start {
                out.extend(ch.to_uppercase());
            } else {
                out.extend(ch.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(ch);
            at_word_start = true;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(headers: &[&str], rows: &[&[&str]]) -> RawTable {
        RawTable::new(
            headers.iter().map(|s| s.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        )
    }

    fn cfg() -> PipelineConfig {
        PipelineConfig::default()
    }

    #[test]
    fn missing_target_is_fatal() {
        let table = ColumnTable::consumption();
        let data = raw(&["speed_kmh", "terrain"], &[&["60", "City"]]);
        let err = clean_consumption(&data, &table, &cfg()).unwrap_err();
        assert!(matches!(err, PipelineError::MissingTarget));
    }

    #[test]
    fn duplicates_are_dropped() {
        let table = ColumnTable::consumption();
        let data = raw(
            &["range_km", "speed_kmh"],
            &[&["100", "60"], &["100", "60"], &["120", "70"]],
        );
        let clean = clean_consumption(&data, &table, &cfg()).unwrap();
        assert_eq!(clean.n_rows, 2);
    }

    #[test]
    fn numeric_imputation_uses_median() {
        let table = ColumnTable::consumption();
        let data = raw(
            &["range_km", "temperature_c"],
            &[&["100", "10"], &["120", ""], &["140", "30"]],
        );
        let clean = clean_consumption(&data, &table, &cfg()).unwrap();
        let temp = clean.numeric_column(field::TEMPERATURE).unwrap();
        assert_eq!(temp, &[10.0, 20.0, 30.0]);
    }

    #[test]
    fn categorical_imputation_uses_mode_and_title_case() {
        let table = ColumnTable::consumption();
        let data = raw(
            &["range_km", "terrain"],
            &[
                &["100", "city"],
                &["120", "city"],
                &["140", ""],
                &["160", "HIGHWAY"],
            ],
        );
        let clean = clean_consumption(&data, &table, &cfg()).unwrap();
        let terrain = clean.categorical_column(field::TERRAIN).unwrap();
        assert_eq!(terrain, &["City", "City", "City", "Highway"]);
    }

    #[test]
    fn empty_categorical_column_becomes_unknown() {
        let filled = impute_categorical(&["".to_string(), " ".to_string()]);
        assert_eq!(filled, &["Unknown", "Unknown"]);
    }

    #[test]
    fn soc_and_temperature_ranges_are_enforced() {
        let table = ColumnTable::consumption();
        let data = raw(
            &["range_km", "soc", "temperature_c"],
            &[
                &["100", "50", "25"],
                &["110", "130", "25"],
                &["120", "50", "75"],
                &["130", "-5", "25"],
            ],
        );
        let clean = clean_consumption(&data, &table, &cfg()).unwrap();
        assert_eq!(clean.n_rows, 1);
        assert_eq!(clean.numeric_column(field::RANGE).unwrap(), &[100.0]);
    }

    #[test]
    fn tiny_tables_are_not_outlier_clipped() {
        let table = ColumnTable::consumption();
        // On a handful of rows the p1/p99 bounds would sit strictly inside
        // [min, max] and throw away valid data; the clip must not run.
        let data = raw(&["range_km"], &[&["100"], &["200"], &["300"]]);
        let clean = clean_consumption(&data, &table, &cfg()).unwrap();
        assert_eq!(
            clean.numeric_column(field::RANGE).unwrap(),
            &[100.0, 200.0, 300.0]
        );
    }

    #[test]
    fn target_outliers_are_clipped_to_quantile_bounds() {
        let table = ColumnTable::consumption();
        // 1000 rows: 990 in [100, 300], 10 extreme outliers.
        let mut rows: Vec<Vec<String>> = (0..990)
            .map(|i| vec![format!("{}", 100.0 + (i as f64) * 0.2)])
            .collect();
        for _ in 0..5 {
            rows.push(vec!["5000".to_string()]);
            rows.push(vec!["1".to_string()]);
        }
        let data = RawTable::new(vec!["range_km".to_string()], rows);
        let clean = clean_consumption(&data, &table, &cfg()).unwrap();

        let original: Vec<f64> = (0..990)
            .map(|i| 100.0 + (i as f64) * 0.2)
            .chain(std::iter::repeat(5000.0).take(5))
            .chain(std::iter::repeat(1.0).take(5))
            .collect();
        let lo = quantile(&original, 0.01);
        let hi = quantile(&original, 0.99);

        assert!(clean.n_rows < 1000);
        for &v in clean.numeric_column(field::RANGE).unwrap() {
            assert!(v >= lo && v <= hi);
        }
    }

    #[test]
    fn stations_require_essential_fields() {
        let table = ColumnTable::stations();
        let data = raw(&["Station Name", "lat"], &[&["A", "12.9"]]);
        let err = clean_stations(&data, &table, &cfg()).unwrap_err();
        match err {
            PipelineError::MissingEssentialFields(missing) => {
                assert_eq!(missing, vec![field::LONGITUDE.to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn stations_dedup_and_synthesize_fields() {
        let table = ColumnTable::stations();
        let data = raw(
            &["Station Name", "lat", "lng"],
            &[
                &["A", "12.9", "77.6"],
                &["A copy", "12.9", "77.6"],
                &["B", "13.1", "80.2"],
                &["Bad", "99.0", "200.0"],
            ],
        );
        let clean = clean_stations(&data, &table, &cfg()).unwrap();
        assert_eq!(clean.n_rows, 2);
        assert_eq!(
            clean.categorical_column(field::STATION_ID).unwrap(),
            &["ST000000", "ST000001"]
        );
        assert_eq!(clean.numeric_column(field::HEALTH_SCORE).unwrap(), &[100.0, 100.0]);
        assert_eq!(
            clean.categorical_column(field::SOURCE).unwrap(),
            &["dataset", "dataset"]
        );
    }

    #[test]
    fn quantile_interpolates_linearly() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(quantile(&values, 0.0), 1.0);
        assert_eq!(quantile(&values, 1.0), 4.0);
        assert_eq!(quantile(&values, 0.5), 2.5);
    }

    #[test]
    fn title_case_normalizes_words() {
        assert_eq!(title_case("hilly"), "Hilly");
        assert_eq!(title_case("ECO MODE"), "Eco Mode");
        assert_eq!(title_case("on"), "On");
    }
}
