//! Command execution.

use crate::{Commands, Window};
use colored::Colorize;
use cps_client::Client;
use cps_protocol::{
    AlternativesParams, BackupParams, Document, DocumentFormat, DocumentSource, Documents,
    ListParams, ListReply, LookupParams, ModifyReply, RestoreParams, SearchParams,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Executes a command and returns the formatted output.
pub fn execute(client: &mut Client, cmd: Commands) -> Result<String, Box<dyn std::error::Error>> {
    match cmd {
        Commands::Status => {
            let reply = client.status()?;
            Ok(format_json(&reply.status()))
        }

        Commands::Search {
            query,
            docs,
            offset,
            list,
            ordering,
            facet,
            exact_match,
            format,
        } => {
            let mut params = SearchParams::new(query);
            params.docs = docs;
            params.offset = offset;
            params.list = list;
            params.ordering = ordering;
            params.facet = facet;
            params.exact_match = exact_match;

            let reply = client.search(params)?;
            let mut output = format_documents(&reply, format)?;

            for (path, terms) in reply.facets()? {
                let _ = writeln!(output, "{} {}", "Facet".bold(), path.cyan());
                for (term, count) in terms {
                    let _ = writeln!(output, "  {term}: {count}");
                }
            }
            Ok(output)
        }

        Commands::Retrieve { ids, format } => {
            let reply = client.retrieve(ids)?;
            format_documents(&reply, format)
        }

        Commands::Lookup { ids, list, format } => {
            let mut params = LookupParams::new(ids);
            params.list = list;
            let reply = client.lookup(params)?;
            format_documents(&reply, format)
        }

        Commands::Insert { documents } => {
            let reply = client.insert(parse_documents(&documents)?)?;
            Ok(format_modified("Inserted", &reply))
        }

        Commands::Replace { documents } => {
            let reply = client.replace(parse_documents(&documents)?)?;
            Ok(format_modified("Replaced", &reply))
        }

        Commands::Delete { ids } => {
            let reply = client.delete(ids)?;
            Ok(format_modified("Deleted", &reply))
        }

        Commands::SearchDelete { query } => {
            let reply = client.search_delete(SearchParams::search_delete(query))?;
            Ok(format!("{} {} documents", "Deleted".green(), reply.hits()?))
        }

        Commands::ListWords { query } => {
            let reply = client.list_words(SearchParams::list_words(query))?;
            let words = reply.words()?;
            if words.values().all(BTreeMap::is_empty) {
                return Ok("No matching words".yellow().to_string());
            }

            let mut output = String::new();
            for (pattern, matches) in words {
                let _ = writeln!(output, "{}", pattern.cyan());
                for (word, count) in matches {
                    let _ = writeln!(output, "  {word}: {count}");
                }
            }
            Ok(output)
        }

        Commands::Alternatives { query, cr, idif, h } => {
            let mut params = AlternativesParams::new(query);
            params.cr = cr;
            params.idif = idif;
            params.h = h;

            let reply = client.alternatives(params)?;
            let mut output = String::new();
            for (term, alternatives) in reply.alternatives()? {
                let _ = writeln!(output, "{} ({})", term.cyan(), alternatives.count);
                for (word, alt) in alternatives.words {
                    let _ = writeln!(
                        output,
                        "  {} count={} cr={} idif={} h={}",
                        word.yellow(),
                        show(alt.count),
                        show(alt.cr),
                        show(alt.idif),
                        show(alt.h)
                    );
                }
            }
            if output.is_empty() {
                return Ok("No alternatives".yellow().to_string());
            }
            Ok(output)
        }

        Commands::ListFirst { window } => {
            let format = window.format;
            let reply = client.list_first(list_params(window))?;
            format_documents(&reply, format)
        }

        Commands::ListLast { window } => {
            let format = window.format;
            let reply = client.list_last(list_params(window))?;
            format_documents(&reply, format)
        }

        Commands::RetrieveFirst { window } => {
            let format = window.format;
            let reply = client.retrieve_first(list_params(window))?;
            format_documents(&reply, format)
        }

        Commands::RetrieveLast { window } => {
            let format = window.format;
            let reply = client.retrieve_last(list_params(window))?;
            format_documents(&reply, format)
        }

        Commands::ListPaths => {
            let paths = client.list_paths()?.paths();
            if paths.is_empty() {
                return Ok("No paths".yellow().to_string());
            }
            Ok(paths.join("\n"))
        }

        Commands::ListFacets { paths } => {
            let reply = client.list_facets(paths)?;
            let mut output = String::new();
            for (path, terms) in reply.facets()? {
                let _ = writeln!(output, "{}", path.cyan());
                for term in terms {
                    let _ = writeln!(output, "  {term}");
                }
            }
            Ok(output)
        }

        Commands::Backup { file, backup_type } => {
            let mut params = BackupParams::new(file.as_str());
            params.backup_type = backup_type;
            let reply = client.backup(params)?;
            Ok(format!(
                "{} storage to {} in {:.3}s",
                "Backed up".green(),
                file.cyan(),
                reply.seconds()?
            ))
        }

        Commands::Restore {
            file,
            no_sequence_check,
        } => {
            let params = RestoreParams::new(file.as_str()).with_sequence_check(!no_sequence_check);
            let reply = client.restore(params)?;
            Ok(format!(
                "{} storage from {} in {:.3}s",
                "Restored".green(),
                file.cyan(),
                reply.seconds()?
            ))
        }

        Commands::Reindex => {
            let reply = client.reindex()?;
            Ok(format!("{} in {:.3}s", "Reindexed".green(), reply.seconds()?))
        }

        Commands::Clear => {
            let reply = client.clear()?;
            Ok(format!("{} in {:.3}s", "Cleared".green(), reply.seconds()?))
        }
    }
}

fn list_params(window: Window) -> ListParams {
    let mut params = ListParams::list_first();
    params.docs = window.docs;
    params.offset = window.offset;
    params
}

/// Parses document arguments: inline JSON, inline markup, or @file.
fn parse_documents(args: &[String]) -> Result<Documents, Box<dyn std::error::Error>> {
    let mut documents = Vec::with_capacity(args.len());
    for arg in args {
        let text = match arg.strip_prefix('@') {
            Some(path) => std::fs::read_to_string(path)?,
            None => arg.clone(),
        };
        let source = if text.trim_start().starts_with('{') {
            DocumentSource::Tree(serde_json::from_str(&text)?)
        } else {
            DocumentSource::Markup(text)
        };
        documents.push(source);
    }
    Ok(Documents::FullyFormed(documents))
}

fn format_modified(action: &str, reply: &ModifyReply) -> String {
    let ids = reply.modified_ids();
    let mut output = format!("{} {} documents", action.green(), ids.len());
    for id in ids {
        let _ = write!(output, "\n  {}", id.as_deref().unwrap_or("?").cyan());
    }
    output
}

fn format_documents(reply: &ListReply, format: DocumentFormat) -> Result<String, Box<dyn std::error::Error>> {
    let window = reply.window()?;
    let mut output = format!(
        "{} {} of {} (documents {}-{})",
        "Found".green(),
        window.found,
        window.hits.map_or_else(|| "?".to_string(), |h| h.to_string()),
        window.from_document,
        window.to_document
    );
    if let Some(more) = window.more.filter(|m| *m > 0) {
        let _ = write!(output, ", {} more", more);
    }
    output.push('\n');

    for doc in reply.documents(format) {
        let id = doc.id.as_deref().unwrap_or("?");
        let body = match doc.document {
            Document::Tree(value) => format_json(&value),
            Document::Element(element) => element.to_xml(),
            Document::Text(text) => text,
        };
        let _ = writeln!(output, "{} {}\n{}", "Document".bold(), id.cyan(), body);
    }
    Ok(output)
}

fn show<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

/// Formats JSON for display.
fn format_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
