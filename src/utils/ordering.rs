//! Date-based ordering of input images.
//!
//! Dates are parsed from file names. The first substring matching the
//! pattern's shape is taken; if it is not a valid calendar date the file is
//! treated as undated.

use super::ImageInput;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatePattern {
    #[serde(rename = "YYYY-MM-DD")]
    YearMonthDayDash,
    #[serde(rename = "YYYY_MM_DD")]
    YearMonthDayUnderscore,
    #[serde(rename = "YYYYMMDD")]
    YearMonthDayCompact,
    #[serde(rename = "MM-DD-YYYY")]
    MonthDayYear,
    #[serde(rename = "DD-MM-YYYY")]
    DayMonthYear,
}

impl DatePattern {
    /// `d` stands for an ASCII digit, anything else must match literally.
    fn shape(&self) -> &'static str {
        match self {
            DatePattern::YearMonthDayDash => "dddd-dd-dd",
            DatePattern::YearMonthDayUnderscore => "dddd_dd_dd",
            DatePattern::YearMonthDayCompact => "dddddddd",
            DatePattern::MonthDayYear => "dd-dd-dddd",
            DatePattern::DayMonthYear => "dd-dd-dddd",
        }
    }

    fn chrono_format(&self) -> &'static str {
        match self {
            DatePattern::YearMonthDayDash => "%Y-%m-%d",
            DatePattern::YearMonthDayUnderscore => "%Y_%m_%d",
            DatePattern::YearMonthDayCompact => "%Y%m%d",
            DatePattern::MonthDayYear => "%m-%d-%Y",
            DatePattern::DayMonthYear => "%d-%m-%Y",
        }
    }
}

impl std::str::FromStr for DatePattern {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "YYYY-MM-DD" => Ok(DatePattern::YearMonthDayDash),
            "YYYY_MM_DD" => Ok(DatePattern::YearMonthDayUnderscore),
            "YYYYMMDD" => Ok(DatePattern::YearMonthDayCompact),
            "MM-DD-YYYY" => Ok(DatePattern::MonthDayYear),
            "DD-MM-YYYY" => Ok(DatePattern::DayMonthYear),
            other => Err(format!("Unknown date pattern: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

fn find_shape<'a>(text: &'a str, shape: &str) -> Option<&'a str> {
    let bytes = text.as_bytes();
    let shape = shape.as_bytes();
    if bytes.len() < shape.len() {
        return None;
    }
    (0..=bytes.len() - shape.len())
        .find(|&start| {
            shape.iter().enumerate().all(|(i, &s)| {
                let b = bytes[start + i];
                if s == b'd' {
                    b.is_ascii_digit()
                } else {
                    b == s
                }
            })
        })
        // the shape is pure ASCII, so the match sits on char boundaries
        .map(|start| &text[start..start + shape.len()])
}

/// Parse a date out of a file name, ignoring its extension.
pub fn parse_date_from_filename(file_name: &str, pattern: DatePattern) -> Option<NaiveDate> {
    let stem = match file_name.rfind('.') {
        Some(dot) if dot > 0 => &file_name[..dot],
        _ => file_name,
    };
    let candidate = find_shape(stem, pattern.shape())?;
    NaiveDate::parse_from_str(candidate, pattern.chrono_format()).ok()
}

/// Stable sort: dated inputs first in date order, then undated inputs in
/// their original order.
pub fn sort_by_date(inputs: Vec<ImageInput>, pattern: DatePattern, order: SortOrder) -> Vec<ImageInput> {
    let (mut dated, undated): (Vec<_>, Vec<_>) = inputs
        .into_iter()
        .map(|input| (parse_date_from_filename(&input.file_name(), pattern), input))
        .partition(|(date, _)| date.is_some());

    dated.sort_by(|(a, _), (b, _)| match order {
        SortOrder::Ascending => a.cmp(b),
        SortOrder::Descending => b.cmp(a),
    });

    dated
        .into_iter()
        .chain(undated)
        .map(|(_, input)| input)
        .collect()
}
