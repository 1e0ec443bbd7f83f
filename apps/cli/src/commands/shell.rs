//! `bhasha shell`: an interactive loop sharing one cache.

use super::{check::print_check, translate::print_translation};
use anyhow::Result;
use bhasha_pipelines::{EntryStatus, LanguageService};
use colored::Colorize;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

const HELP: &str = "\
Type text to translate it, or one of:
  :check <text>    check text for likely problems
  :stats           show cache statistics and entries
  :clear           drop every cached pipeline
  :clear-errors    forget recent load failures
  :model           show the loaded translation model
  :help            show this help
  :quit            leave the shell";

/// A parsed shell line.
#[derive(Debug, PartialEq, Eq)]
enum ShellCommand<'a> {
    Translate(&'a str),
    Check(&'a str),
    Stats,
    Clear,
    ClearErrors,
    Model,
    Help,
    Quit,
    Unknown(&'a str),
    Empty,
}

fn parse(line: &str) -> ShellCommand<'_> {
    let line = line.trim();
    let Some(command) = line.strip_prefix(':') else {
        return if line.is_empty() { ShellCommand::Empty } else { ShellCommand::Translate(line) };
    };

    let (name, rest) = command.split_once(char::is_whitespace).unwrap_or((command, ""));
    match name {
        "check" => ShellCommand::Check(rest.trim()),
        "stats" => ShellCommand::Stats,
        "clear" => ShellCommand::Clear,
        "clear-errors" => ShellCommand::ClearErrors,
        "model" => ShellCommand::Model,
        "help" | "h" => ShellCommand::Help,
        "quit" | "q" | "exit" => ShellCommand::Quit,
        _ => ShellCommand::Unknown(name),
    }
}

fn prompt() -> Result<()> {
    print!("{} ", "bhasha>".cyan().bold());
    std::io::stdout().flush()?;
    Ok(())
}

fn print_stats(service: &LanguageService) {
    let stats = service.cache_stats();
    println!("{}", "Cache".bold());
    println!("  entries:   {}", stats.size);
    println!("  hits:      {}", stats.hits);
    println!("  misses:    {}", stats.misses);
    println!("  hit rate:  {:.1}%", stats.hit_rate * 100.0);
    println!("  coalesced: {}", stats.coalesced);
    println!("  evictions: {}", stats.evictions);

    for entry in service.cache_entries() {
        let status = match entry.status {
            EntryStatus::Ready => "ready".green(),
            EntryStatus::Loading => "loading".cyan(),
            EntryStatus::Errored => "errored".red(),
        };
        let detail = match (entry.candidate, entry.error) {
            (_, Some(error)) => error,
            (Some(candidate), None) => candidate.to_string(),
            (None, None) => String::new(),
        };
        println!(
            "  {} [{}] used {}x, idle {}s {}",
            entry.key.bold(),
            status,
            entry.access_count,
            entry.idle.as_secs(),
            detail.dimmed()
        );
    }
}

/// Execute shell command
pub async fn execute(service: &LanguageService) -> Result<()> {
    println!("{}", "Bhasha interactive shell. Type :help for commands.".dimmed());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt()?;

    while let Some(line) = lines.next_line().await? {
        match parse(&line) {
            ShellCommand::Empty => {}
            ShellCommand::Quit => break,
            ShellCommand::Help => println!("{}", HELP),
            ShellCommand::Translate(text) => match service.translate(text, None, None).await {
                Ok(result) => print_translation(&result),
                Err(e) => eprintln!("{} {}", "Error:".red().bold(), e),
            },
            ShellCommand::Check("") => eprintln!("{} :check needs some text", "Error:".red().bold()),
            ShellCommand::Check(text) => match service.check(text).await {
                Ok(check) => print_check(&check),
                Err(e) => eprintln!("{} {}", "Error:".red().bold(), e),
            },
            ShellCommand::Stats => print_stats(service),
            ShellCommand::Clear => {
                service.clear_cache();
                println!("Cache cleared");
            }
            ShellCommand::ClearErrors => {
                let cleared = service.clear_errors();
                println!("Cleared {} error state(s)", cleared);
            }
            ShellCommand::Model => match service.current_translation_model() {
                Some(candidate) => println!("{}", candidate),
                None => println!("No translation model loaded"),
            },
            ShellCommand::Unknown(name) => {
                eprintln!("{} unknown command ':{}' (type :help)", "Error:".red().bold(), name);
            }
        }
        prompt()?;
    }

    println!();
    Ok(())
}
