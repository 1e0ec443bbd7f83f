//! `bhasha check`.

use anyhow::Result;
use bhasha_pipelines::{CheckStatus, LanguageService, TextCheck};
use colored::Colorize;

/// Execute check command
pub async fn execute(service: &LanguageService, text: &str, json: bool) -> Result<()> {
    let check = service.check(text).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&check)?);
    } else {
        print_check(&check);
    }
    Ok(())
}

pub(crate) fn print_check(check: &TextCheck) {
    let status = match check.status {
        CheckStatus::Correct => "Correct".green().bold(),
        CheckStatus::Flagged => "Flagged".yellow().bold(),
        CheckStatus::Unverified => "Unverified".cyan().bold(),
    };
    println!("{} (confidence {:.2})", status, check.confidence);

    if let (Some(label), Some(model)) = (&check.label, &check.model) {
        println!("  {}", format!("{} via {}", label, model).dimmed());
    }
    if check.status == CheckStatus::Unverified {
        println!("  {}", "Classifier unavailable; the text was not checked.".dimmed());
    }
}
