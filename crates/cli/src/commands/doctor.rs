use serde::Serialize;
use vendedor_core::catalog::{CatalogProvider, CsvCatalog};
use vendedor_core::config::{AppConfig, LoadOptions};

use crate::commands::CommandResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(options: LoadOptions, json_output: bool) -> CommandResult {
    let report = build_report(options);
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    if json_output {
        let output = serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
        return CommandResult { exit_code, output };
    }

    CommandResult { exit_code, output: render_human(&report) }
}

fn build_report(options: LoadOptions) -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(options) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_catalog(&config));
            checks.push(check_llm_settings(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["catalog_availability", "llm_settings"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_catalog(config: &AppConfig) -> DoctorCheck {
    let catalog = CsvCatalog::new(&config.catalog.path, config.catalog.cache_ttl());
    match catalog.load_products() {
        Ok(products) if products.is_empty() => DoctorCheck {
            name: "catalog_availability",
            status: CheckStatus::Fail,
            details: format!("`{}` has no usable product rows", config.catalog.path.display()),
        },
        Ok(products) => {
            let mut categories = products.iter().map(|p| p.category.as_str()).collect::<Vec<_>>();
            categories.sort_unstable();
            categories.dedup();
            DoctorCheck {
                name: "catalog_availability",
                status: CheckStatus::Pass,
                details: format!(
                    "{} products across {} categories from `{}`",
                    products.len(),
                    categories.len(),
                    config.catalog.path.display()
                ),
            }
        }
        Err(error) => DoctorCheck {
            name: "catalog_availability",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
    }
}

/// Reports where chat requests would go. No request is sent.
fn check_llm_settings(config: &AppConfig) -> DoctorCheck {
    let credentials = if config.llm.api_key.is_some() { "api key set" } else { "no api key" };
    DoctorCheck {
        name: "llm_settings",
        status: CheckStatus::Pass,
        details: format!(
            "{} model `{}` at {} ({credentials})",
            config.llm.provider.as_str(),
            config.llm.model,
            config.llm.effective_base_url()
        ),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
