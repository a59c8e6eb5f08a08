//! KDL configuration parsing.

mod helpers;
mod sections;

pub use helpers::offset_to_line_col;

use anyhow::Result;
use tracing::{debug, warn};

use crate::Config;

/// Build a [`Config`] from a parsed KDL document
pub fn parse_document(doc: &::kdl::KdlDocument) -> Result<Config> {
    let mut config = Config::default();

    for node in doc.nodes() {
        match node.name().value() {
            "acme" => config.acme = sections::parse_acme_config(node)?,
            "vault" => config.vault = sections::parse_vault_config(node)?,
            "renewal" => config.renewal = sections::parse_renewal_config(node)?,
            "storage" => config.storage = sections::parse_storage_config(node)?,
            "logging" => config.logging = sections::parse_logging_config(node)?,
            other => {
                warn!(block = %other, "Ignoring unknown configuration block");
            }
        }
    }

    debug!(
        environment = %config.acme.environment,
        storage = %config.storage.path.display(),
        "Parsed KDL configuration"
    );

    Ok(config)
}

/// Render a KDL parse error with line context
pub fn render_parse_error(content: &str, e: &::kdl::KdlError) -> String {
    use miette::Diagnostic;

    let mut error_msg = String::from("KDL configuration parse error:\n\n");
    let mut found_details = false;

    if let Some(related) = e.related() {
        for diagnostic in related {
            error_msg.push_str(&format!("  {}\n", diagnostic));
            found_details = true;

            if let Some(labels) = diagnostic.labels() {
                for label in labels {
                    let (line, col) = offset_to_line_col(content, label.offset());
                    error_msg.push_str(&format!("\n  --> at line {}, column {}\n", line, col));

                    if let Some(line_content) = content.lines().nth(line.saturating_sub(1)) {
                        error_msg.push_str(&format!("{:>4} | {}\n", line, line_content));
                        error_msg.push_str(&format!(
                            "     | {}^",
                            " ".repeat(col.saturating_sub(1))
                        ));
                        if let Some(label_msg) = label.label() {
                            error_msg.push_str(&format!(" {}", label_msg));
                        }
                        error_msg.push('\n');
                    }
                }
            }
        }
    }

    if !found_details {
        error_msg.push_str(&format!("  {}\n", e));
    }

    error_msg
}
