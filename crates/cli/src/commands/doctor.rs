use serde::Serialize;

use leadflow_core::config::{AppConfig, LoadOptions};
use leadflow_crm::RestCrmClient;
use leadflow_db::connect;
use leadflow_extract::ChatCompletionExtractor;
use leadflow_gateway::GatewayClient;

use super::runtime;

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: &'static str,
    detail: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    status: &'static str,
    checks: Vec<DoctorCheck>,
}

pub fn run(json: bool) -> String {
    let report = build_report();
    if json {
        serde_json::to_string_pretty(&report)
            .unwrap_or_else(|error| format!("{{\"serialization_error\":\"{error}\"}}"))
    } else {
        render_text(&report)
    }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config",
                status: "ok",
                detail: "configuration loaded and validated".to_string(),
            });
            config
        }
        Err(error) => {
            checks.push(DoctorCheck { name: "config", status: "error", detail: error.to_string() });
            return DoctorReport { status: "error", checks };
        }
    };

    match runtime() {
        Ok(rt) => {
            let database_check = rt.block_on(async {
                match connect(&config.database).await {
                    Ok(pool) => {
                        let ping =
                            sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(&pool).await;
                        pool.close().await;
                        match ping {
                            Ok(_) => DoctorCheck {
                                name: "database",
                                status: "ok",
                                detail: format!("reachable at `{}`", config.database.url),
                            },
                            Err(error) => DoctorCheck {
                                name: "database",
                                status: "error",
                                detail: error.to_string(),
                            },
                        }
                    }
                    Err(error) => DoctorCheck {
                        name: "database",
                        status: "error",
                        detail: error.to_string(),
                    },
                }
            });
            checks.push(database_check);
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "database",
                status: "error",
                detail: format!("runtime unavailable: {error}"),
            });
        }
    }

    checks.push(match RestCrmClient::from_config(&config.crm) {
        Ok(_) => DoctorCheck {
            name: "crm",
            status: "ok",
            detail: format!(
                "client ready for `{}`",
                config.crm.instance_url.as_deref().unwrap_or("unknown")
            ),
        },
        Err(error) if !config.crm.enabled => DoctorCheck {
            name: "crm",
            status: "disabled",
            detail: format!("runs will be simulated ({error})"),
        },
        Err(error) => DoctorCheck { name: "crm", status: "error", detail: error.to_string() },
    });

    checks.push(match ChatCompletionExtractor::from_config(&config.extractor) {
        Ok(_) => DoctorCheck {
            name: "extractor",
            status: "ok",
            detail: format!("provider {:?}, model `{}`", config.extractor.provider, config.extractor.model),
        },
        Err(error) => {
            DoctorCheck { name: "extractor", status: "error", detail: error.to_string() }
        }
    });

    checks.push(match GatewayClient::from_config(&config.gateway) {
        Ok(_) => DoctorCheck {
            name: "gateway",
            status: "ok",
            detail: format!("client ready for `{}`", config.gateway.base_url),
        },
        Err(error) if !config.gateway.enabled => DoctorCheck {
            name: "gateway",
            status: "disabled",
            detail: format!("acknowledgments disabled ({error})"),
        },
        Err(error) => DoctorCheck { name: "gateway", status: "error", detail: error.to_string() },
    });

    let status =
        if checks.iter().any(|check| check.status == "error") { "error" } else { "ok" };
    DoctorReport { status, checks }
}

fn render_text(report: &DoctorReport) -> String {
    let mut lines = vec![format!("doctor: {}", report.status)];
    for check in &report.checks {
        lines.push(format!("  {:<10} {:<9} {}", check.name, check.status, check.detail));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::{render_text, DoctorCheck, DoctorReport};

    #[test]
    fn text_rendering_lists_every_check() {
        let report = DoctorReport {
            status: "ok",
            checks: vec![
                DoctorCheck { name: "config", status: "ok", detail: "loaded".to_string() },
                DoctorCheck { name: "crm", status: "disabled", detail: "simulated".to_string() },
            ],
        };

        let text = render_text(&report);
        assert!(text.starts_with("doctor: ok"));
        assert!(text.contains("config"));
        assert!(text.contains("disabled"));
    }
}
