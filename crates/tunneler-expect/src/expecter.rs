//! The expect loop.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace};
use tunneler_process::{ReadOutcome, SubprocessChannel};

use crate::buffer::ExpectBuffer;
use crate::error::Result;
use crate::pattern::PatternTable;

/// A successful match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match<K> {
    /// Kind of the matching table entry.
    pub kind: K,
    /// The matched text (empty for end of file and timeout entries).
    pub text: String,
    /// Output consumed before the match.
    pub before: String,
    /// Capture groups of a regex entry.
    pub captures: Vec<String>,
}

impl<K> Match<K> {
    fn condition(kind: K, before: String) -> Self {
        Self {
            kind,
            text: String::new(),
            before,
            captures: Vec::new(),
        }
    }
}

/// Result of one [`Expecter::expect`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expectation<K> {
    /// A table entry matched.
    Matched(Match<K>),
    /// The deadline passed with no output pending and the table has no
    /// timeout entry.
    TimedOut,
    /// The deadline passed while unmatched output, such as a partial line,
    /// was pending and the table has no timeout entry. The text stays
    /// buffered for the next call.
    Unknown(String),
    /// The stream is closed and the table has no end-of-file entry.
    StreamClosed,
}

/// Reads a process's output and matches it against pattern tables.
pub struct Expecter {
    channel: Box<dyn SubprocessChannel>,
    buffer: ExpectBuffer,
    closed: bool,
}

impl fmt::Debug for Expecter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Expecter")
            .field("pid", &self.channel.id())
            .field("buffered", &self.buffer.len())
            .field("closed", &self.closed)
            .finish()
    }
}

impl Expecter {
    /// Wraps a channel with a default-sized buffer.
    pub fn new(channel: Box<dyn SubprocessChannel>) -> Self {
        Self::with_buffer(channel, ExpectBuffer::new())
    }

    /// Wraps a channel with the given buffer.
    pub fn with_buffer(channel: Box<dyn SubprocessChannel>, buffer: ExpectBuffer) -> Self {
        Self {
            channel,
            buffer,
            closed: false,
        }
    }

    /// Waits up to `timeout` for an entry of `table` to match.
    pub async fn expect<K: Clone>(
        &mut self,
        table: &PatternTable<K>,
        timeout: Duration,
    ) -> Result<Expectation<K>> {
        self.expect_until(table, Instant::now() + timeout).await
    }

    /// Waits until `deadline` for an entry of `table` to match.
    ///
    /// Dropping the returned future loses no output: buffered bytes stay
    /// buffered and the next call picks them up.
    pub async fn expect_until<K: Clone>(
        &mut self,
        table: &PatternTable<K>,
        deadline: Instant,
    ) -> Result<Expectation<K>> {
        loop {
            if let Some(found) = table.find(self.buffer.as_bytes()) {
                let consumed = self.buffer.consume(found.end);
                let before = String::from_utf8_lossy(&consumed[..found.start]).into_owned();
                let text = String::from_utf8_lossy(&consumed[found.start..]).into_owned();
                trace!(text = %text, "pattern matched");
                return Ok(Expectation::Matched(Match {
                    kind: found.kind,
                    text,
                    before,
                    captures: found.captures,
                }));
            }

            if self.closed {
                let rest = String::from_utf8_lossy(&self.buffer.take_all()).into_owned();
                return Ok(match table.eof_kind() {
                    Some(kind) => Expectation::Matched(Match::condition(kind, rest)),
                    None => Expectation::StreamClosed,
                });
            }

            match self.channel.read_chunk(deadline).await? {
                ReadOutcome::Data(chunk) => {
                    let dropped = self.buffer.push(&chunk);
                    if dropped > 0 {
                        debug!(dropped, "output buffer full, discarded oldest bytes");
                    }
                }
                ReadOutcome::Closed => {
                    trace!("output stream closed");
                    self.closed = true;
                }
                ReadOutcome::TimedOut => {
                    return Ok(match table.timeout_kind() {
                        Some(kind) => Expectation::Matched(Match::condition(kind, String::new())),
                        None if self.buffer.is_empty() => Expectation::TimedOut,
                        None => Expectation::Unknown(
                            String::from_utf8_lossy(self.buffer.as_bytes()).into_owned(),
                        ),
                    });
                }
            }
        }
    }

    /// Writes `text` and a newline to the process.
    pub async fn write_line(&mut self, text: &str) -> Result<()> {
        self.channel.write_line(text).await?;
        Ok(())
    }

    /// Force-terminates the process. Returns true once it is gone.
    pub async fn terminate(&mut self) -> bool {
        self.channel.terminate().await
    }

    /// OS process id, if any.
    pub fn id(&self) -> Option<u32> {
        self.channel.id()
    }

    /// Returns true once the output stream reached end of file.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Output received but not yet consumed by a match.
    pub fn buffered(&self) -> &[u8] {
        self.buffer.as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tunneler_process::{CommandLine, FakeSpawner, Script, Spawner};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Kind {
        Timeout,
        Ok,
        Down,
        Exited,
    }

    fn table() -> PatternTable<Kind> {
        PatternTable::new()
            .timeout(Kind::Timeout)
            .literal(Kind::Down, "ssh: connect to host")
            .eof(Kind::Exited)
            .literal(Kind::Ok, "connection ok")
    }

    async fn expecter(script: Script) -> (FakeSpawner, Expecter) {
        let spawner = FakeSpawner::new();
        spawner.push_script(script);
        let channel = spawner.spawn(&CommandLine::new("autossh")).await.unwrap();
        (spawner, Expecter::new(channel))
    }

    fn kind(outcome: Expectation<Kind>) -> Kind {
        match outcome {
            Expectation::Matched(m) => m.kind,
            other => panic!("expected a match, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_match_consumes_through_end() {
        let (_spawner, mut expecter) =
            expecter(Script::new().output("noise connection ok tail")).await;

        let outcome = expecter.expect(&table(), Duration::from_secs(30)).await.unwrap();
        let Expectation::Matched(m) = outcome else {
            panic!("expected a match");
        };
        assert_eq!(m.kind, Kind::Ok);
        assert_eq!(m.before, "noise ");
        assert_eq!(m.text, "connection ok");
        assert_eq!(expecter.buffered(), b" tail");
    }

    #[tokio::test(start_paused = true)]
    async fn test_match_split_across_chunks() {
        let (_spawner, mut expecter) =
            expecter(Script::new().output("connec").output("tion ok\n")).await;

        let outcome = expecter.expect(&table(), Duration::from_secs(30)).await.unwrap();
        assert_eq!(kind(outcome), Kind::Ok);
    }

    #[tokio::test(start_paused = true)]
    async fn test_successive_matches_in_one_chunk() {
        let (_spawner, mut expecter) = expecter(
            Script::new().output("ssh: connect to host a port 22\nconnection ok\n"),
        )
        .await;

        let t = table();
        assert_eq!(kind(expecter.expect(&t, Duration::from_secs(1)).await.unwrap()), Kind::Down);
        assert_eq!(kind(expecter.expect(&t, Duration::from_secs(1)).await.unwrap()), Kind::Ok);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_entry() {
        let (_spawner, mut expecter) = expecter(Script::new()).await;

        let start = Instant::now();
        let outcome = expecter.expect(&table(), Duration::from_secs(30)).await.unwrap();
        assert_eq!(kind(outcome), Kind::Timeout);
        assert!(start.elapsed() >= Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bare_outcomes_without_condition_entries() {
        let bare = PatternTable::new().literal(Kind::Ok, "connection ok");

        let (_spawner, mut expecter) = expecter(Script::new()).await;
        let outcome = expecter.expect(&bare, Duration::from_secs(1)).await.unwrap();
        assert_eq!(outcome, Expectation::TimedOut);

        let (_spawner, mut expecter) = self::expecter(Script::new().close()).await;
        let outcome = expecter.expect(&bare, Duration::from_secs(1)).await.unwrap();
        assert_eq!(outcome, Expectation::StreamClosed);
        assert!(expecter.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_line_is_unknown() {
        let bare = PatternTable::new().literal(Kind::Ok, "connection ok");
        let (_spawner, mut expecter) = expecter(Script::new().output("Warning: partial li")).await;

        let outcome = expecter.expect(&bare, Duration::from_secs(1)).await.unwrap();
        assert_eq!(outcome, Expectation::Unknown("Warning: partial li".to_string()));
        assert_eq!(expecter.buffered(), b"Warning: partial li");

        // With a timeout entry the table decides.
        let outcome = expecter.expect(&table(), Duration::from_secs(1)).await.unwrap();
        assert_eq!(kind(outcome), Kind::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_buffered_text_matches_before_eof() {
        let (_spawner, mut expecter) =
            expecter(Script::new().output("connection ok\nbye").close()).await;

        let t = table();
        assert_eq!(kind(expecter.expect(&t, Duration::from_secs(1)).await.unwrap()), Kind::Ok);

        let Expectation::Matched(m) = expecter.expect(&t, Duration::from_secs(1)).await.unwrap()
        else {
            panic!("expected eof match");
        };
        assert_eq!(m.kind, Kind::Exited);
        assert_eq!(m.before, "\nbye");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_wait_keeps_output() {
        let (_spawner, mut expecter) = expecter(Script::new().output("connec")).await;

        let t = table();
        let _ = tokio::time::timeout(
            Duration::from_secs(1),
            expecter.expect(&t, Duration::from_secs(30)),
        )
        .await;
        assert_eq!(expecter.buffered(), b"connec");
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_line_reaches_process() {
        let (spawner, mut expecter) = expecter(Script::new()).await;
        expecter.write_line("yes").await.unwrap();
        assert_eq!(spawner.written_lines(), vec!["yes"]);

        assert!(expecter.terminate().await);
        assert!(expecter.write_line("late").await.is_err());
    }
}
