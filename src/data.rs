//! Table loading and RFM feature derivation using Polars

use crate::error::ChurnError;
use crate::features::{ChurnRule, RfmRecord};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use polars::prelude::*;
use std::path::Path;
use tracing::{debug, info};

pub const CUSTOMER_ID: &str = "customer_id";
pub const CUSTOMER_NAME: &str = "name";
pub const TRANSACTION_ID: &str = "transaction_id";
pub const TRANSACTION_DATE: &str = "transaction_date";
pub const AMOUNT: &str = "amount";
pub const PAYMENT_METHOD: &str = "payment_method";

const TRANSACTION_TS: &str = "transaction_ts";
const LAST_TS: &str = "last_ts";
const FREQUENCY: &str = "frequency";
const MONETARY: &str = "monetary";

const SECONDS_PER_DAY: i64 = 86_400;

/// Read a CSV table with a header row
pub fn load_table<P: AsRef<Path>>(path: P) -> crate::Result<DataFrame> {
    let path = path.as_ref();
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;

    debug!(path = %path.display(), rows = df.height(), "Loaded table");
    Ok(df)
}

/// Fail with a schema error unless `df` carries `column`
pub(crate) fn require_column(df: &DataFrame, table: &str, column: &str) -> crate::Result<()> {
    if df.get_column_names().contains(&column) {
        Ok(())
    } else {
        Err(ChurnError::Schema(format!(
            "missing column '{column}' in {table}"
        )))
    }
}

/// Parse a transaction timestamp
///
/// Accepts plain dates, naive date-times with either separator and optional
/// fractional seconds, and RFC 3339 (normalized to UTC).
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date.and_time(NaiveTime::MIN));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(ts);
        }
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.naive_utc())
}

/// Join key as a string column so integer and string ids join alike
fn customer_keys(df: &DataFrame) -> crate::Result<Series> {
    Ok(df.column(CUSTOMER_ID)?.cast(&DataType::String)?)
}

/// Normalize transactions into (customer_id, epoch seconds, amount)
fn normalized_transactions(transactions: &DataFrame) -> crate::Result<DataFrame> {
    for column in [CUSTOMER_ID, TRANSACTION_DATE, AMOUNT] {
        require_column(transactions, "transactions", column)?;
    }

    let dates = transactions.column(TRANSACTION_DATE)?.cast(&DataType::String)?;
    let timestamps = dates
        .str()?
        .into_iter()
        .enumerate()
        .map(|(row, raw)| {
            raw.and_then(parse_timestamp)
                .map(|ts| ts.and_utc().timestamp())
                .ok_or_else(|| {
                    ChurnError::Schema(format!(
                        "{TRANSACTION_DATE} at row {row} is not a timestamp: {}",
                        raw.unwrap_or("<null>")
                    ))
                })
        })
        .collect::<crate::Result<Vec<i64>>>()?;

    let amounts = transactions.column(AMOUNT)?.cast(&DataType::Float64)?;
    let amounts = amounts
        .f64()?
        .into_iter()
        .enumerate()
        .map(|(row, amount)| match amount {
            Some(value) if value.is_finite() && value >= 0.0 => Ok(value),
            Some(value) => Err(ChurnError::Schema(format!(
                "{AMOUNT} at row {row} must be non-negative, got {value}"
            ))),
            None => Err(ChurnError::Schema(format!(
                "{AMOUNT} at row {row} is missing or non-numeric"
            ))),
        })
        .collect::<crate::Result<Vec<f64>>>()?;

    Ok(DataFrame::new(vec![
        customer_keys(transactions)?,
        Series::new(TRANSACTION_TS, timestamps),
        Series::new(AMOUNT, amounts),
    ])?)
}

/// Derive one labeled RFM record per customer present in both tables
///
/// Customers without transactions and transactions of unknown customers are
/// dropped by the inner join. Recency is measured in whole days from the last
/// transaction to midnight of `reference_date`. Records are sorted by
/// customer id.
pub fn build_rfm(
    customers: &DataFrame,
    transactions: &DataFrame,
    reference_date: NaiveDate,
    rule: ChurnRule,
) -> crate::Result<Vec<RfmRecord>> {
    require_column(customers, "customers", CUSTOMER_ID)?;
    let transactions = normalized_transactions(transactions)?;
    let known_customers = DataFrame::new(vec![customer_keys(customers)?])?;

    let reference_ts = reference_date.and_time(NaiveTime::MIN).and_utc().timestamp();

    // One grouped pass computes all three reducers over the same partition
    let rfm_df = transactions
        .lazy()
        .join(
            known_customers.lazy().select([col(CUSTOMER_ID).unique()]),
            [col(CUSTOMER_ID)],
            [col(CUSTOMER_ID)],
            JoinArgs::new(JoinType::Inner),
        )
        .group_by([col(CUSTOMER_ID)])
        .agg([
            col(TRANSACTION_TS).max().alias(LAST_TS),
            len().alias(FREQUENCY),
            col(AMOUNT).sum().alias(MONETARY),
        ])
        .collect()?;

    if rfm_df.height() == 0 {
        return Err(ChurnError::EmptyInput(
            "no transaction matched a known customer".to_string(),
        ));
    }

    let ids = rfm_df.column(CUSTOMER_ID)?.str()?;
    let last_seen = rfm_df.column(LAST_TS)?.i64()?;
    let frequency = rfm_df.column(FREQUENCY)?.cast(&DataType::Int64)?;
    let frequency = frequency.i64()?;
    let monetary = rfm_df.column(MONETARY)?.f64()?;

    let mut records = Vec::with_capacity(rfm_df.height());
    for (((id, last), count), total) in ids
        .into_iter()
        .zip(last_seen.into_iter())
        .zip(frequency.into_iter())
        .zip(monetary.into_iter())
    {
        let (Some(id), Some(last), Some(count), Some(total)) = (id, last, count, total) else {
            continue;
        };
        let recency_days = (reference_ts - last).div_euclid(SECONDS_PER_DAY);
        records.push(RfmRecord {
            customer_id: id.to_string(),
            recency_days,
            frequency: count,
            monetary: total,
            churn_label: rule.label(recency_days),
        });
    }
    records.sort_by(|a, b| a.customer_id.cmp(&b.customer_id));

    let churned = records.iter().filter(|r| r.churn_label == 1).count();
    info!(
        customers = records.len(),
        churned,
        threshold_days = rule.threshold_days,
        reference_date = %reference_date,
        "Built RFM features"
    );

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn reference() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, 1).unwrap()
    }

    fn customers() -> DataFrame {
        df!(
            CUSTOMER_ID => &[1i64, 2, 3, 4],
            CUSTOMER_NAME => &["Asha", "Ben", "Chloe", "Dev"],
            "signup_date" => &["2023-01-05", "2023-02-11", "2023-03-20", "2023-04-02"]
        )
        .unwrap()
    }

    fn transactions() -> DataFrame {
        df!(
            TRANSACTION_ID => &[101i64, 102, 103, 104, 105, 106],
            CUSTOMER_ID => &[1i64, 1, 1, 2, 3, 3],
            TRANSACTION_DATE => &[
                "2024-01-10",
                "2024-03-01",
                "2024-03-22",
                "2024-01-31",
                "2023-12-01 14:30:00",
                "2024-01-30T09:15:00",
            ],
            AMOUNT => &[100.0, 250.0, 150.0, 20.0, 75.5, 24.5],
            PAYMENT_METHOD => &["card", "upi", "card", "cash", "card", "upi"]
        )
        .unwrap()
    }

    #[test]
    fn test_build_rfm_aggregates_per_customer() {
        let records = build_rfm(&customers(), &transactions(), reference(), ChurnRule::default())
            .unwrap();

        // Customer 4 never transacted
        assert_eq!(records.len(), 3);

        let first = &records[0];
        assert_eq!(first.customer_id, "1");
        assert_eq!(first.frequency, 3);
        assert!((first.monetary - 500.0).abs() < 1e-9);
        assert_eq!(first.recency_days, 10);
        assert_eq!(first.churn_label, 0);

        let second = &records[1];
        assert_eq!(second.recency_days, 61);
        assert_eq!(second.churn_label, 1);

        let third = &records[2];
        assert_eq!(third.frequency, 2);
        assert!((third.monetary - 100.0).abs() < 1e-9);
        // Last seen 2024-01-30 09:15, so 61 full days before the reference midnight
        assert_eq!(third.recency_days, 61);
    }

    #[test]
    fn test_transactions_of_unknown_customers_are_dropped() {
        let customers = df!(CUSTOMER_ID => &[1i64]).unwrap();
        let records =
            build_rfm(&customers, &transactions(), reference(), ChurnRule::default()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].customer_id, "1");
    }

    #[test]
    fn test_string_and_integer_keys_join() {
        let customers = df!(CUSTOMER_ID => &["1", "2", "3"]).unwrap();
        let records =
            build_rfm(&customers, &transactions(), reference(), ChurnRule::default()).unwrap();
        assert_eq!(records.len(), 3);
    }

    #[test]
    fn test_missing_columns_are_schema_errors() {
        let no_amount = transactions().drop(AMOUNT).unwrap();
        assert!(matches!(
            build_rfm(&customers(), &no_amount, reference(), ChurnRule::default()),
            Err(ChurnError::Schema(_))
        ));

        let no_key = customers().drop(CUSTOMER_ID).unwrap();
        assert!(matches!(
            build_rfm(&no_key, &transactions(), reference(), ChurnRule::default()),
            Err(ChurnError::Schema(_))
        ));

        let no_date = transactions().drop(TRANSACTION_DATE).unwrap();
        assert!(matches!(
            build_rfm(&customers(), &no_date, reference(), ChurnRule::default()),
            Err(ChurnError::Schema(_))
        ));
    }

    #[test]
    fn test_unparseable_date_is_schema_error() {
        let bad = df!(
            CUSTOMER_ID => &[1i64],
            TRANSACTION_DATE => &["last tuesday"],
            AMOUNT => &[10.0]
        )
        .unwrap();
        let err = build_rfm(&customers(), &bad, reference(), ChurnRule::default()).unwrap_err();
        assert!(matches!(err, ChurnError::Schema(ref msg) if msg.contains("last tuesday")));
    }

    #[test]
    fn test_negative_amount_is_schema_error() {
        let bad = df!(
            CUSTOMER_ID => &[1i64],
            TRANSACTION_DATE => &["2024-03-01"],
            AMOUNT => &[-10.0]
        )
        .unwrap();
        assert!(matches!(
            build_rfm(&customers(), &bad, reference(), ChurnRule::default()),
            Err(ChurnError::Schema(_))
        ));
    }

    #[test]
    fn test_empty_join_is_empty_input_error() {
        let strangers = df!(CUSTOMER_ID => &[99i64]).unwrap();
        assert!(matches!(
            build_rfm(&strangers, &transactions(), reference(), ChurnRule::default()),
            Err(ChurnError::EmptyInput(_))
        ));
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert!(parse_timestamp("2024-03-01").is_some());
        assert!(parse_timestamp("2024-03-01 10:11:12").is_some());
        assert!(parse_timestamp("2024-03-01T10:11:12.250").is_some());
        assert!(parse_timestamp("2024-03-01T10:11:12Z").is_some());
        assert!(parse_timestamp("01/03/2024").is_none());
    }

    #[test]
    fn test_load_table() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "customer_id,name,signup_date").unwrap();
        writeln!(file, "1,Asha,2023-01-05").unwrap();
        writeln!(file, "2,Ben,2023-02-11").unwrap();

        let df = load_table(file.path()).unwrap();
        assert_eq!(df.height(), 2);
        assert!(require_column(&df, "customers", CUSTOMER_ID).is_ok());
        assert!(require_column(&df, "customers", AMOUNT).is_err());
    }
}
