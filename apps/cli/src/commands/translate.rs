//! `bhasha translate`.

use anyhow::Result;
use bhasha_pipelines::{LanguageService, TranslationResult};
use colored::Colorize;

/// Execute translate command
pub async fn execute(
    service: &LanguageService,
    text: &str,
    src: Option<&str>,
    tgt: Option<&str>,
    json: bool,
) -> Result<()> {
    let result = service.translate(text, src, tgt).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_translation(&result);
    }
    Ok(())
}

pub(crate) fn print_translation(result: &TranslationResult) {
    println!("{}", result.translation_text.bold());

    if let Some(ref model) = result.model {
        println!("  {}", format!("via {}", model).dimmed());
    }
    if result.fallback_used {
        let note = result.note.as_deref().unwrap_or("Dictionary translation");
        println!("  {} {}", "!".yellow().bold(), note.yellow());
    }
}
