//! Interactive chat session (`docbot chat`).
//!
//! Reads one line at a time, answers it through the
//! [`ConversationManager`], and keeps going after per-turn errors.
//!
//! Turns are not cancellable. The session installs its own Ctrl-C handler
//! for its whole lifetime, so pressing Ctrl-C while an answer is being
//! produced does not abort the process. The turn finishes and its answer
//! is printed, then the session says goodbye instead of prompting again.
//! Ctrl-C at the prompt exits at once.

use anyhow::Result;
use std::future::Future;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::chat::{ChatSettings, ContextStatus, ConversationManager, Reply};
use crate::config::{chat_api_key, Config};
use crate::embedding;
use crate::llm::AnthropicClient;
use crate::query::write_results;
use crate::retrieve::Retriever;
use crate::store::SqliteIndex;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Verbosity {
    /// Append sources and print retrieval warnings.
    pub verbose: bool,
    /// Also show ranked chunks and annotate context blocks.
    pub very_verbose: bool,
}

impl Verbosity {
    fn shows_sources(&self) -> bool {
        self.verbose || self.very_verbose
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Continue,
    Exit,
}

pub struct ChatSession {
    manager: ConversationManager,
    verbosity: Verbosity,
}

impl ChatSession {
    pub fn new(manager: ConversationManager, verbosity: Verbosity) -> Self {
        Self { manager, verbosity }
    }

    pub fn manager(&self) -> &ConversationManager {
        &self.manager
    }

    fn write_banner(out: &mut impl Write) -> std::io::Result<()> {
        writeln!(out, "\nWelcome to the Documentation Assistant")?;
        writeln!(out, "Type 'exit' to quit, 'help' for commands\n")
    }

    fn write_help(out: &mut impl Write) -> std::io::Result<()> {
        writeln!(out, "\nAvailable Commands:")?;
        writeln!(out, "  help     Show this help message")?;
        writeln!(out, "  exit     Exit the program (also: quit, Ctrl-C)")?;
        writeln!(out, "\nOptions:")?;
        writeln!(out, "  -v, --verbose        Show source references")?;
        writeln!(out, "  --very-verbose       Show source chunks and metadata")
    }

    fn write_context_warning(&self, reply: &Reply, out: &mut impl Write) -> std::io::Result<()> {
        if !self.verbosity.shows_sources() {
            return Ok(());
        }
        match reply.context_status {
            ContextStatus::Found => Ok(()),
            ContextStatus::NoResults => writeln!(
                out,
                "\nWarning: No relevant documentation found in local storage."
            ),
            ContextStatus::BelowThreshold { min_relevance } => writeln!(
                out,
                "\nWarning: Found results but none met the minimum relevance threshold of {}",
                min_relevance
            ),
            ContextStatus::RetrievalFailed => writeln!(
                out,
                "\nWarning: Documentation search failed; answering without it."
            ),
        }
    }

    /// Handle one input line.
    async fn handle_line(&mut self, line: &str, out: &mut impl Write) -> std::io::Result<Step> {
        let input = line.trim();
        if input.is_empty() {
            return Ok(Step::Continue);
        }
        match input.to_lowercase().as_str() {
            "exit" | "quit" => {
                writeln!(out, "Goodbye!")?;
                return Ok(Step::Exit);
            }
            "help" => {
                Self::write_help(out)?;
                return Ok(Step::Continue);
            }
            _ => {}
        }

        match self.manager.respond(input).await {
            Ok(reply) => {
                self.write_context_warning(&reply, out)?;
                if self.verbosity.very_verbose && !reply.results.is_empty() {
                    write_results(out, &reply.results, true)?;
                }
                writeln!(out, "\n{}", reply.render(self.verbosity.shows_sources()))?;
            }
            Err(e) => {
                tracing::error!("{}", e);
                writeln!(out, "\nError: {}", e)?;
            }
        }
        Ok(Step::Continue)
    }

    /// Run the read-answer loop until `exit`, end of input, or Ctrl-C.
    pub async fn run<R>(&mut self, input: R, out: &mut impl Write) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        self.run_until(input, out, tokio::signal::ctrl_c()).await
    }

    /// Run the read-answer loop until `exit`, end of input, or `interrupt`
    /// resolves. An interrupt that fires during a turn takes effect once
    /// that turn's answer has been written.
    pub async fn run_until<R, I>(
        &mut self,
        input: R,
        out: &mut impl Write,
        interrupt: I,
    ) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        I: Future,
    {
        let mut lines = input.lines();
        tokio::pin!(interrupt);
        Self::write_banner(out)?;

        loop {
            write!(out, "\n> ")?;
            out.flush()?;

            let line = tokio::select! {
                biased;
                _ = &mut interrupt => {
                    writeln!(out, "\nGoodbye!")?;
                    break;
                }
                line = lines.next_line() => line?,
            };

            let Some(line) = line else {
                writeln!(out)?;
                break;
            };

            if self.handle_line(&line, out).await? == Step::Exit {
                break;
            }
        }
        Ok(())
    }
}

/// `docbot chat`: wire the on-disk index, embedder, and chat API into an
/// interactive session on stdin/stdout.
pub async fn run_chat(config: &Config, verbosity: Verbosity) -> Result<()> {
    let settings = ChatSettings::from_config(config)?;
    let llm = config.require_llm()?;
    let client = AnthropicClient::new(&llm, chat_api_key()?)?;

    let index = Arc::new(SqliteIndex::open(config).await?);
    let embedder = embedding::create_provider(&config.embedding)?;
    let retriever = Retriever::new(embedder, index);

    let manager = ConversationManager::new(settings, retriever, Arc::new(client))
        .with_annotations(verbosity.very_verbose);
    let mut session = ChatSession::new(manager, verbosity);

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    session.run(stdin, &mut std::io::stdout()).await
}
