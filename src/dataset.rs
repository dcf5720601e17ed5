use std::collections::HashMap;
use std::io::Read;

use crate::catalog::CatalogError;

/// Columns never used as model inputs.
pub const EXCLUDED_COLUMNS: [&str; 2] = ["RUL", "Exp_Cell_Type"];

/// Number of leading rows inspected when feature names have to be inferred.
pub const INFERENCE_ROWS: usize = 100;

/// Cell markers read as missing values rather than text, as pandas does.
const MISSING_MARKERS: [&str; 18] = [
    "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN", "<NA>",
    "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// Numeric columns of the reference dataset, in file order.
#[derive(Debug, Clone, Default)]
pub struct ReferenceDataset {
    columns: Vec<NumericColumn>,
}

/// A column that is numeric within the first `INFERENCE_ROWS` rows. `values`
/// is empty when a later row turns out not to be numeric.
#[derive(Debug, Clone)]
struct NumericColumn {
    name: String,
    values: Vec<f64>,
}

impl ReferenceDataset {
    pub fn from_reader(reader: impl Read) -> Result<Self, CatalogError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let headers: Vec<String> = csv_reader
            .headers()
            .map_err(|e| CatalogError::Dataset(e.to_string()))?
            .iter()
            .map(|h| h.to_string())
            .collect();

        struct Scan {
            numeric: bool,
            numeric_in_head: bool,
            values: Vec<f64>,
        }
        let mut scans: Vec<Scan> = headers
            .iter()
            .map(|_| Scan {
                numeric: true,
                numeric_in_head: true,
                values: Vec::new(),
            })
            .collect();

        for (row_index, record) in csv_reader.records().enumerate() {
            let record = record.map_err(|e| CatalogError::Dataset(e.to_string()))?;
            for (scan, cell) in scans.iter_mut().zip(record.iter()) {
                if !scan.numeric || is_missing(cell) {
                    continue;
                }
                match cell.parse::<f64>() {
                    Ok(value) if !value.is_nan() => scan.values.push(value),
                    Ok(_) => {}
                    Err(_) => {
                        scan.numeric = false;
                        if row_index < INFERENCE_ROWS {
                            scan.numeric_in_head = false;
                        }
                        scan.values.clear();
                    }
                }
            }
        }

        let columns = headers
            .into_iter()
            .zip(scans)
            .filter(|(name, scan)| {
                scan.numeric_in_head && !EXCLUDED_COLUMNS.contains(&name.as_str())
            })
            .map(|(name, scan)| NumericColumn {
                name,
                values: scan.values,
            })
            .collect();

        Ok(Self { columns })
    }

    /// Names of numeric feature columns, used when no model metadata lists them.
    pub fn feature_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Median of every numeric column that has at least one value.
    pub fn medians(&self) -> HashMap<String, f64> {
        self.columns
            .iter()
            .filter_map(|c| median(&c.values).map(|m| (c.name.clone(), m)))
            .collect()
    }
}

fn is_missing(cell: &str) -> bool {
    cell.is_empty() || MISSING_MARKERS.contains(&cell)
}

pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "\
Exp_Cell_Type,Exp_Temperature,Cycle_Index,Time at 4.15V (s),RUL,Label
A,25,1,5000,900,x
B,35,3,,800,y
A,30,2,5200,700,z
";

    #[test]
    fn infers_numeric_columns_without_excluded_ones() {
        let dataset = ReferenceDataset::from_reader(CSV.as_bytes()).unwrap();
        assert_eq!(
            dataset.feature_names(),
            vec!["Exp_Temperature", "Cycle_Index", "Time at 4.15V (s)"]
        );
    }

    #[test]
    fn medians_skip_empty_cells() {
        let medians = ReferenceDataset::from_reader(CSV.as_bytes())
            .unwrap()
            .medians();
        assert_eq!(medians["Exp_Temperature"], 30.0);
        assert_eq!(medians["Cycle_Index"], 2.0);
        assert_eq!(medians["Time at 4.15V (s)"], 5100.0);
        assert!(!medians.contains_key("RUL"));
        assert!(!medians.contains_key("Label"));
    }

    #[test]
    fn missing_value_markers_keep_columns_numeric() {
        let csv = "Exp_Voltage,Cycle_Index,Label,RUL\n\
                   3.6,1,NA,900\n\
                   NA,3,n/a,800\n\
                   3.8,N/A,null,700\n\
                   <NA>,#N/A,None,600\n";
        let dataset = ReferenceDataset::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(dataset.feature_names(), vec!["Exp_Voltage", "Cycle_Index", "Label"]);

        let medians = dataset.medians();
        assert_eq!(medians["Exp_Voltage"], 3.7);
        assert_eq!(medians["Cycle_Index"], 2.0);
        assert!(!medians.contains_key("Label"));
    }

    fn numeric_rows_then(text_row: usize) -> String {
        let mut csv = String::from("Exp_Temperature,Cycle_Index,RUL\n");
        for row in 0..INFERENCE_ROWS + 20 {
            if row == text_row {
                csv.push_str(&format!("{row},faulty,0\n"));
            } else {
                csv.push_str(&format!("{row},{row},0\n"));
            }
        }
        csv
    }

    #[test]
    fn text_after_inference_rows_keeps_name_but_drops_median() {
        let csv = numeric_rows_then(INFERENCE_ROWS + 5);
        let dataset = ReferenceDataset::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(dataset.feature_names(), vec!["Exp_Temperature", "Cycle_Index"]);

        let medians = dataset.medians();
        assert!(medians.contains_key("Exp_Temperature"));
        assert!(!medians.contains_key("Cycle_Index"));
    }

    #[test]
    fn text_within_inference_rows_excludes_column() {
        let csv = numeric_rows_then(INFERENCE_ROWS - 1);
        let dataset = ReferenceDataset::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(dataset.feature_names(), vec!["Exp_Temperature"]);
    }

    #[test]
    fn median_of_even_count_averages_middle_pair() {
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }
}
