// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, bail};

use crate::model::round_amount;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    Required,
    InvalidNumber,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Required => f.write_str("value is required"),
            Self::InvalidNumber => f.write_str("invalid number"),
        }
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult<T> = std::result::Result<T, ValidationError>;

/// Decimal and digit-grouping separators used to display and parse amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumberFormat {
    decimal_separator: char,
    grouping_separator: Option<char>,
}

impl Default for NumberFormat {
    fn default() -> Self {
        Self {
            decimal_separator: '.',
            grouping_separator: Some(','),
        }
    }
}

impl NumberFormat {
    pub fn new(decimal_separator: char, grouping_separator: Option<char>) -> Result<Self> {
        if decimal_separator.is_ascii_digit() || decimal_separator == '-' {
            bail!("decimal separator {decimal_separator:?} must not be a digit or '-'");
        }
        if let Some(grouping) = grouping_separator {
            if grouping == decimal_separator {
                bail!(
                    "grouping separator must differ from decimal separator {decimal_separator:?}"
                );
            }
            if grouping.is_ascii_digit() || grouping == '-' {
                bail!("grouping separator {grouping:?} must not be a digit or '-'");
            }
        }
        Ok(Self {
            decimal_separator,
            grouping_separator,
        })
    }

    pub const fn decimal_separator(&self) -> char {
        self.decimal_separator
    }

    pub const fn grouping_separator(&self) -> Option<char> {
        self.grouping_separator
    }

    /// Formats with exactly two decimals and grouped thousands, e.g. `1,234.50`.
    pub fn format_amount(&self, value: f64) -> String {
        let rounded = round_amount(value);
        let cents = (rounded.abs() * 100.0).round() as u64;
        let sign = if rounded < 0.0 && cents > 0 { "-" } else { "" };
        format!(
            "{sign}{}{}{:02}",
            self.group_digits(cents / 100),
            self.decimal_separator,
            cents % 100
        )
    }

    /// Formats a margin ratio as a whole percentage, e.g. `1.15` as `115%`.
    pub fn format_percent(&self, ratio: f64) -> String {
        let percent = (ratio * 100.0).round();
        let sign = if percent < 0.0 { "-" } else { "" };
        format!("{sign}{}%", self.group_digits(percent.abs() as u64))
    }

    /// Shortest round-trippable rendering for an editable input, without grouping.
    pub fn format_input(&self, value: f64) -> String {
        let raw = value.to_string();
        if self.decimal_separator == '.' {
            raw
        } else {
            raw.replace('.', &self.decimal_separator.to_string())
        }
    }

    pub fn parse_amount(&self, input: &str) -> ValidationResult<f64> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::Required);
        }

        let mut normalized = String::with_capacity(trimmed.len());
        let mut seen_digit = false;
        let mut seen_decimal = false;
        for (index, ch) in trimmed.chars().enumerate() {
            if ch.is_ascii_digit() {
                seen_digit = true;
                normalized.push(ch);
            } else if ch == self.decimal_separator {
                if seen_decimal {
                    return Err(ValidationError::InvalidNumber);
                }
                seen_decimal = true;
                normalized.push('.');
            } else if Some(ch) == self.grouping_separator && !seen_decimal {
                continue;
            } else if ch == '-' && index == 0 {
                normalized.push(ch);
            } else {
                return Err(ValidationError::InvalidNumber);
            }
        }

        if !seen_digit {
            return Err(ValidationError::InvalidNumber);
        }
        let value = normalized
            .parse::<f64>()
            .map_err(|_| ValidationError::InvalidNumber)?;
        if !value.is_finite() {
            return Err(ValidationError::InvalidNumber);
        }
        Ok(value)
    }

    fn group_digits(&self, value: u64) -> String {
        let digits = value.to_string();
        let Some(separator) = self.grouping_separator else {
            return digits;
        };

        let mut out = String::with_capacity(digits.len() + digits.len() / 3);
        for (index, ch) in digits.chars().enumerate() {
            if index > 0 && (digits.len() - index) % 3 == 0 {
                out.push(separator);
            }
            out.push(ch);
        }
        out
    }
}
