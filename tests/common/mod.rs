//! Shared helpers for the integration tests
#![allow(dead_code)]

#[path = "../../src/sav/fixtures.rs"]
pub mod fixtures;

use fixtures::{FixtureValue, SavBuilder, SavCompression};

/// Survey-like file covering numeric, string, date and labelled columns
pub fn survey_file(compression: SavCompression) -> Vec<u8> {
    // 2021-06-15 as seconds since 1582-10-14
    let interview = 12_219_379_200.0 + 18_793.0 * 86_400.0;

    SavBuilder::new()
        .compression(compression)
        .file_label("Household survey 2021")
        .numeric("respondent_id", 0)
        .string("region", 16)
        .label("Region of residence")
        .numeric("household_income", 2)
        .missing_values(&[-1.0])
        .numeric_with_format("interview_date", 20, 11, 0)
        .numeric("satisfied", 0)
        .value_labels(&[(1.0, "Yes"), (0.0, "No")])
        .row(vec![
            1.0.into(),
            "North East".into(),
            42_500.75.into(),
            interview.into(),
            1.0.into(),
        ])
        .row(vec![
            2.0.into(),
            "Wales".into(),
            (-1.0).into(),
            (interview + 86_400.0).into(),
            0.0.into(),
        ])
        .row(vec![
            3.0.into(),
            "London, Inner".into(),
            FixtureValue::Missing,
            FixtureValue::Missing,
            1.0.into(),
        ])
        .build()
}
