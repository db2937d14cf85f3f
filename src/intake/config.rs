// SPDX-License-Identifier: MIT

//! Runtime configuration, read from the environment (and `.env` via dotenv)

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use crate::engine::answers::DATE_FORMAT;
use crate::engine::predicate::EvalContext;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct IntakeConfig {
    /// INTAKE_PORT
    pub bind_port: u16,
    /// INTAKE_BUNDLE_DIR: program bundles loaded by `serve`
    pub bundle_dir: PathBuf,
    /// INTAKE_MAX_RECONCILE_ATTEMPTS
    pub max_reconcile_attempts: u32,
    /// INTAKE_EVALUATION_DATE: pins "today" for age predicates
    pub eligibility_date_override: Option<NaiveDate>,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            bind_port: 3000,
            bundle_dir: PathBuf::from("programs"),
            max_reconcile_attempts: 3,
            eligibility_date_override: None,
        }
    }
}

impl IntakeConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unparseable values keep their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(port) = parsed(&lookup, "INTAKE_PORT") {
            config.bind_port = port;
        }
        if let Some(dir) = lookup("INTAKE_BUNDLE_DIR") {
            config.bundle_dir = PathBuf::from(dir);
        }
        if let Some(attempts) = parsed::<u32>(&lookup, "INTAKE_MAX_RECONCILE_ATTEMPTS") {
            config.max_reconcile_attempts = attempts.max(1);
        }
        if let Some(raw) = lookup("INTAKE_EVALUATION_DATE") {
            match NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT) {
                Ok(date) => config.eligibility_date_override = Some(date),
                Err(_) => log::warn!("Ignoring INTAKE_EVALUATION_DATE={}: not a YYYY-MM-DD date", raw),
            }
        }

        config
    }

    /// Evaluation context for today, or the configured override
    pub fn eval_context(&self) -> EvalContext {
        self.eligibility_date_override
            .map(EvalContext::at)
            .unwrap_or_else(EvalContext::now)
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("Ignoring {}={}: invalid value", key, raw);
            None
        }
    }
}
