use std::io::Write;

use enum_dispatch::enum_dispatch;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{VelError, VelResult};

/// Utility function to convert from polars `AnyValue` to `serde_json::Value`.
/// Covers the types the pipeline tables hold.
fn any_value_to_json(value: &AnyValue) -> VelResult<Value> {
    match value {
        AnyValue::Null => Ok(Value::Null),
        AnyValue::Boolean(b) => Ok(Value::Bool(*b)),
        AnyValue::String(s) => Ok(Value::String((*s).to_string())),
        AnyValue::StringOwned(s) => Ok(Value::String(s.to_string())),
        AnyValue::Int32(n) => Ok(json!(*n)),
        AnyValue::Int64(n) => Ok(json!(*n)),
        AnyValue::UInt32(n) => Ok(json!(*n)),
        AnyValue::UInt64(n) => Ok(json!(*n)),
        AnyValue::Float32(n) => Ok(json!(*n)),
        // Non-finite floats have no JSON representation
        AnyValue::Float64(n) if n.is_finite() => Ok(json!(*n)),
        AnyValue::Float64(_) => Ok(Value::Null),
        other => Err(VelError::Configuration(format!(
            "Cannot write value of type {} as JSON",
            other.dtype()
        ))),
    }
}

/// Trait to define different output generators. `save` writes the serialized `DataFrame` to a
/// writer, `format` returns it as a string.
#[enum_dispatch]
pub trait OutputGenerator {
    fn save(&self, writer: &mut impl Write, df: &mut DataFrame) -> VelResult<()>;
    fn format(&self, df: &mut DataFrame) -> VelResult<String> {
        let mut data: Vec<u8> = vec![];
        self.save(&mut data, df)?;
        String::from_utf8(data)
            .map_err(|e| VelError::Configuration(format!("Output is not valid UTF-8: {e}")))
    }
}

/// Enum of OutputFormatters one for each potential output type
#[enum_dispatch(OutputGenerator)]
#[derive(Serialize, Deserialize, Debug)]
pub enum OutputFormatter {
    Csv(CSVFormatter),
    Json(JSONFormatter),
}

/// Format the results as a CSV file with a header row
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct CSVFormatter;

impl OutputGenerator for CSVFormatter {
    fn save(&self, writer: &mut impl Write, df: &mut DataFrame) -> VelResult<()> {
        CsvWriter::new(writer).include_header(true).finish(df)?;
        Ok(())
    }
}

/// Format the results as a JSON array with one object per row
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct JSONFormatter {
    pub pretty: bool,
}

impl OutputGenerator for JSONFormatter {
    fn save(&self, writer: &mut impl Write, df: &mut DataFrame) -> VelResult<()> {
        let mut records = Vec::with_capacity(df.height());
        for idx in 0..df.height() {
            let mut record = serde_json::Map::new();
            for column in df.get_columns() {
                record.insert(column.name().to_string(), any_value_to_json(&column.get(idx)?)?);
            }
            records.push(Value::Object(record));
        }
        let result = if self.pretty {
            serde_json::to_writer_pretty(writer, &records)
        } else {
            serde_json::to_writer(writer, &records)
        };
        result.map_err(|e| VelError::Configuration(format!("Failed to write JSON: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> DataFrame {
        df!(
            "year" => &[2013, 2014],
            "country_code" => &["KE", "GH"],
            "mean_log_vel" => &[Some(7.5), None]
        )
        .unwrap()
    }

    #[test]
    fn csv_formatter_should_write_header_and_rows() -> anyhow::Result<()> {
        let output = OutputFormatter::Csv(CSVFormatter).format(&mut table())?;
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines, vec!["year,country_code,mean_log_vel", "2013,KE,7.5", "2014,GH,"]);
        Ok(())
    }

    #[test]
    fn json_formatter_should_write_one_object_per_row() -> anyhow::Result<()> {
        let output = OutputFormatter::Json(JSONFormatter::default()).format(&mut table())?;
        let parsed: Value = serde_json::from_str(&output)?;
        assert_eq!(
            parsed,
            json!([
                {"year": 2013, "country_code": "KE", "mean_log_vel": 7.5},
                {"year": 2014, "country_code": "GH", "mean_log_vel": null}
            ])
        );
        Ok(())
    }

    #[test]
    fn non_finite_values_should_be_null() -> anyhow::Result<()> {
        let mut df = df!("x" => &[f64::NAN])?;
        let output = JSONFormatter::default().format(&mut df)?;
        assert_eq!(output, r#"[{"x":null}]"#);
        Ok(())
    }
}
