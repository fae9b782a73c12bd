//! Interactive chat loop (`ragchat chat`).
//!
//! Reads lines from stdin and background results from the session's event
//! channel concurrently, so answers and upload results are printed as soon
//! as they arrive while the prompt stays usable.
//!
//! Lines starting with `/` are commands (see [`HELP`]); anything else is a
//! chat query.

use anyhow::Result;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};

use ragchat_core::backend::Backend;
use ragchat_core::ingest::{is_text_like, FieldIndexError};
use ragchat_core::namespace::NamespaceChange;

use crate::attachment::load_attachment;
use crate::export::save_transcript;
use crate::render::{self, OutputMode};
use crate::session::{ChatSession, SessionOptions};

pub const HELP: &str = "\
Commands:
  /ns [name]                 show or switch the namespace
  /filters                   show filter choices for this namespace
  /filter <key> [value]      filter on key=value (no value: All)
  /clear-filters             drop all filters
  /text <text>               set the document text
  /paste                     enter document text, end with a line holding '.'
  /file <path>               attach a file as the document
  /unfile                    detach the file
  /meta                      show the document draft and metadata rows
  /meta add <key> [value]    append a metadata row
  /meta set <i> <key> [value] edit row i
  /meta rm <i>               remove row i
  /meta reset                back to the default row
  /ingest                    upload the document
  /history                   show the conversation
  /save <path>               write the transcript as JSON
  /session                   show session details
  /help                      this text
  /quit                      exit
Anything else is sent as a question.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaCommand {
    Show,
    Add { key: String, value: String },
    Set { index: usize, key: String, value: String },
    Remove(usize),
    Reset,
}

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Empty,
    Query(String),
    Namespace(Option<String>),
    Filters,
    Filter { key: String, value: String },
    ClearFilters,
    Text(String),
    Paste,
    File(PathBuf),
    Unfile,
    Meta(MetaCommand),
    Ingest,
    History,
    Save(PathBuf),
    Session,
    Help,
    Quit,
}

fn split_word(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(char::is_whitespace) {
        Some(i) => (&s[..i], s[i..].trim()),
        None => (s, ""),
    }
}

fn parse_index(s: &str) -> Result<usize, String> {
    s.parse()
        .map_err(|_| format!("Expected a row number, got '{}'", s))
}

fn parse_meta(args: &str) -> Result<MetaCommand, String> {
    let (sub, rest) = split_word(args);
    match sub {
        "" => Ok(MetaCommand::Show),
        "add" => {
            let (key, value) = split_word(rest);
            if key.is_empty() {
                return Err("Usage: /meta add <key> [value]".to_string());
            }
            Ok(MetaCommand::Add {
                key: key.to_string(),
                value: value.to_string(),
            })
        }
        "set" => {
            let (index, rest) = split_word(rest);
            let (key, value) = split_word(rest);
            if index.is_empty() {
                return Err("Usage: /meta set <i> <key> [value]".to_string());
            }
            Ok(MetaCommand::Set {
                index: parse_index(index)?,
                key: key.to_string(),
                value: value.to_string(),
            })
        }
        "rm" => Ok(MetaCommand::Remove(parse_index(rest)?)),
        "reset" => Ok(MetaCommand::Reset),
        other => Err(format!("Unknown /meta subcommand: {}", other)),
    }
}

/// Parse one line of input.
pub fn parse_line(line: &str) -> Result<Command, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Command::Empty);
    }
    if !line.starts_with('/') {
        return Ok(Command::Query(line.to_string()));
    }

    let (name, args) = split_word(line);
    let cmd = match name {
        "/ns" => Command::Namespace(if args.is_empty() { None } else { Some(args.to_string()) }),
        "/filters" => Command::Filters,
        "/filter" => {
            let (key, value) = split_word(args);
            if key.is_empty() {
                return Err("Usage: /filter <key> [value]".to_string());
            }
            Command::Filter {
                key: key.to_string(),
                value: value.to_string(),
            }
        }
        "/clear-filters" => Command::ClearFilters,
        "/text" => Command::Text(args.to_string()),
        "/paste" => Command::Paste,
        "/file" => {
            if args.is_empty() {
                return Err("Usage: /file <path>".to_string());
            }
            Command::File(PathBuf::from(args))
        }
        "/unfile" => Command::Unfile,
        "/meta" => Command::Meta(parse_meta(args)?),
        "/ingest" => Command::Ingest,
        "/history" => Command::History,
        "/save" => {
            if args.is_empty() {
                return Err("Usage: /save <path>".to_string());
            }
            Command::Save(PathBuf::from(args))
        }
        "/session" => Command::Session,
        "/help" | "/?" => Command::Help,
        "/quit" | "/exit" => Command::Quit,
        other => return Err(format!("Unknown command: {} (try /help)", other)),
    };
    Ok(cmd)
}

enum Flow {
    Continue,
    Quit,
}

struct Repl {
    session: ChatSession,
    mode: OutputMode,
    paste: Option<String>,
}

fn out() -> std::io::StdoutLock<'static> {
    std::io::stdout().lock()
}

impl Repl {
    fn report_index_error(e: FieldIndexError) {
        println!("Error: {}", e);
    }

    fn handle(&mut self, command: Command) -> Result<Flow> {
        match command {
            Command::Empty => {}
            Command::Query(query) => match self.session.send_query(&query) {
                Ok(()) => self.mode.indicate("Thinking..."),
                Err(e) => println!("Error: {}", e),
            },
            Command::Namespace(None) => println!("Namespace: {}", self.session.namespace()),
            Command::Namespace(Some(name)) => match self.session.set_namespace(&name) {
                Ok(NamespaceChange::Switched { current, .. }) => {
                    println!("Switched to namespace '{}'", current);
                    if self.session.conversation().is_empty() {
                        println!("{}", render::EMPTY_STATE_HINT);
                    }
                }
                Ok(NamespaceChange::Unchanged) => {
                    println!("Already in namespace '{}'", self.session.namespace())
                }
                Err(e) => println!("Error: {}", e),
            },
            Command::Filters => {
                render::render_filters(
                    &mut out(),
                    self.session.catalog_entry(),
                    self.session.filters(),
                )?;
            }
            Command::Filter { key, value } => match self.session.select_filter(&key, &value) {
                Ok(_) => render::render_filters(
                    &mut out(),
                    self.session.catalog_entry(),
                    self.session.filters(),
                )?,
                Err(e) => println!("Error: {}", e),
            },
            Command::ClearFilters => {
                self.session.clear_filters();
                println!("Filters cleared.");
            }
            Command::Text(text) => {
                let draft = self.session.ingest_mut();
                if draft.file().is_some() {
                    println!("A file is attached; /unfile first to ingest text.");
                } else {
                    draft.set_text(text);
                    println!("{}", render::document_loaded(draft.text().chars().count()));
                }
            }
            Command::Paste => {
                if self.session.ingest().file().is_some() {
                    println!("A file is attached; /unfile first to ingest text.");
                } else {
                    println!("Paste document text; finish with a line containing only '.'");
                    self.paste = Some(String::new());
                }
            }
            Command::File(path) => match load_attachment(&path) {
                Ok(file) => {
                    let previewable = is_text_like(&file);
                    let draft = self.session.ingest_mut();
                    draft.attach_file(file);
                    if previewable {
                        println!("{}", render::document_loaded(draft.text().chars().count()));
                    } else {
                        println!("Attached {}", draft.text());
                    }
                }
                Err(e) => println!("Error: {:#}", e),
            },
            Command::Unfile => match self.session.ingest_mut().detach_file() {
                Some(file) => println!("Detached {}", file.file_name),
                None => println!("No file attached."),
            },
            Command::Meta(meta) => {
                let fields = self.session.ingest_mut().fields_mut();
                match meta {
                    MetaCommand::Show => {}
                    MetaCommand::Add { key, value } => {
                        fields.append(key, value);
                    }
                    MetaCommand::Set { index, key, value } => {
                        if let Err(e) = fields
                            .set_key(index, key)
                            .and_then(|_| fields.set_value(index, value))
                        {
                            Self::report_index_error(e);
                        }
                    }
                    MetaCommand::Remove(index) => {
                        if let Err(e) = fields.remove(index) {
                            Self::report_index_error(e);
                        }
                    }
                    MetaCommand::Reset => fields.reset(),
                }
                render::render_draft(&mut out(), self.session.ingest())?;
            }
            Command::Ingest => match self.session.submit_ingest() {
                Ok(()) => {
                    render::render_ingest_status(&mut out(), self.session.ingest().status())?
                }
                Err(e) => println!("Error: {}", e),
            },
            Command::History => {
                render::render_history(&mut out(), self.session.conversation().messages())?
            }
            Command::Save(path) => {
                match save_transcript(self.session.conversation(), self.session.namespace(), &path) {
                    Ok(()) => println!("Saved transcript to {}", path.display()),
                    Err(e) => println!("Error: {:#}", e),
                }
            }
            Command::Session => {
                let conversation = self.session.conversation();
                println!("Session:   {}", conversation.session().token());
                println!("Namespace: {}", self.session.namespace());
                println!("Messages:  {}", conversation.len());
                println!("Filters:   {}", self.session.filters().len());
                if conversation.is_awaiting() {
                    println!("Waiting for an answer...");
                }
            }
            Command::Help => println!("{}", HELP),
            Command::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    fn handle_line(&mut self, line: &str) -> Result<Flow> {
        if let Some(buffer) = self.paste.as_mut() {
            if line.trim() == "." {
                if let Some(text) = self.paste.take() {
                    let draft = self.session.ingest_mut();
                    draft.set_text(text);
                    println!("{}", render::document_loaded(draft.text().chars().count()));
                }
            } else {
                buffer.push_str(line);
                buffer.push('\n');
            }
            return Ok(Flow::Continue);
        }

        match parse_line(line) {
            Ok(command) => self.handle(command),
            Err(message) => {
                println!("{}", message);
                Ok(Flow::Continue)
            }
        }
    }

    fn prompt(&self) {
        if self.paste.is_none() && self.mode == OutputMode::Interactive {
            print!("[{}]> ", self.session.namespace());
            let _ = std::io::stdout().flush();
        }
    }
}

/// Run the interactive loop until `/quit` or end of input.
pub async fn run_repl(backend: Arc<dyn Backend>, options: SessionOptions, mode: OutputMode) -> Result<()> {
    let session = ChatSession::new(backend, options)?;
    let mut repl = Repl {
        session,
        mode,
        paste: None,
    };

    println!(
        "ragchat: namespace '{}', session {}",
        repl.session.namespace(),
        repl.session.conversation().session().token()
    );
    println!("{}", render::EMPTY_STATE_HINT);
    println!("Type /help for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    repl.prompt();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if let Flow::Quit = repl.handle_line(&line)? {
                    break;
                }
                repl.prompt();
            }
            Some(event) = repl.session.next_event() => {
                let update = repl.session.apply(event);
                let last = repl.session.conversation().messages().last();
                render::render_update(&mut out(), &update, last)?;
            }
        }
    }

    // Piped input may end while an answer is still on its way.
    let pending = repl
        .session
        .run_until(|s| !s.conversation().is_awaiting() && !s.ingest().is_uploading())
        .await;
    for update in pending {
        let last = repl.session.conversation().messages().last();
        render::render_update(&mut out(), &update, last)?;
    }
    Ok(())
}
