//! Operator-driven browser session: export actions as terminal prompts.
//!
//! The engine only needs each trigger to result in a file landing in the
//! staging directory. This driver delegates the clicking to a human sitting
//! at the browser, which keeps the pipeline usable when no automation
//! harness is wired up: the operator performs the action on screen and
//! confirms, and the staging watcher takes it from there.

use std::io::{self, Write};

use archiver_core::session::{BrowserSession, Result, SearchOutcome, SessionError};
use async_trait::async_trait;

/// Browser session where a human operator performs each platform action.
#[derive(Debug, Default)]
pub struct ManualSession;

impl ManualSession {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn prompt(message: &str) -> Result<String> {
    print!("{message}");
    io::stdout()
        .flush()
        .map_err(|e| SessionError::ActionFailed(e.to_string()))?;

    let mut line = String::new();
    let read = io::stdin()
        .read_line(&mut line)
        .map_err(|e| SessionError::ActionFailed(e.to_string()))?;
    if read == 0 {
        return Err(SessionError::Closed("stdin closed".to_string()));
    }
    Ok(line.trim().to_string())
}

fn confirm(message: &str) -> Result<()> {
    prompt(&format!("{message} Press Enter when done. ")).map(|_| ())
}

#[async_trait]
impl BrowserSession for ManualSession {
    async fn search_client(
        &mut self,
        client_name: &str,
        client_number: &str,
    ) -> Result<SearchOutcome> {
        loop {
            let answer = prompt(&format!(
                "Search the platform for '{client_name}' (client number {client_number}).\n\
                 Enter the document count shown, or 'n' if there is no match: "
            ))?;
            if answer.eq_ignore_ascii_case("n") {
                return Ok(SearchOutcome::NoMatch);
            }
            match answer.parse::<u32>() {
                Ok(total_documents) => return Ok(SearchOutcome::Found { total_documents }),
                Err(_) => println!("Please enter a whole number or 'n'."),
            }
        }
    }

    async fn trigger_manifest_export(&mut self) -> Result<()> {
        confirm("Export the document list (CSV) for this client.")
    }

    async fn trigger_single_document_export(&mut self, document_id: &str) -> Result<()> {
        confirm(&format!("Download the single document with id {document_id}."))
    }

    async fn trigger_page_bulk_export(&mut self) -> Result<()> {
        confirm("Select all documents on the current page and export them as a zip.")
    }

    async fn has_next_page(&mut self) -> Result<bool> {
        loop {
            let answer = prompt("Is there another page of documents? [y/N]: ")?;
            match answer.to_ascii_lowercase().as_str() {
                "y" | "yes" => return Ok(true),
                "" | "n" | "no" => return Ok(false),
                _ => println!("Please answer y or n."),
            }
        }
    }

    async fn advance_page(&mut self) -> Result<()> {
        confirm("Go to the next page of documents.")
    }
}
