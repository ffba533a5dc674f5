//! Password and passphrase entry
//!
//! Secrets are read with echo disabled when stdin is a terminal, and as a
//! plain line otherwise, so piped input and tests work without a TTY. The
//! choice is made on every read rather than once at startup.

use std::io::{self, BufRead, IsTerminal, Write};
use std::sync::Mutex;

use zeroize::Zeroizing;

/// Reads a single secret from some input
pub trait SecretReader: Send + Sync {
    /// Read one secret, without its trailing newline
    fn read_secret(&self) -> io::Result<Zeroizing<String>>;
}

/// Masked read from the controlling terminal
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalSecretReader;

impl SecretReader for TerminalSecretReader {
    fn read_secret(&self) -> io::Result<Zeroizing<String>> {
        let secret = Zeroizing::new(rpassword::read_password()?);
        // Hidden input swallows the user's newline
        eprintln!();
        Ok(secret)
    }
}

/// Read one line, failing on EOF and trimming trailing whitespace
fn read_trimmed_line<R: BufRead>(reader: &mut R) -> io::Result<String> {
    let mut line = String::new();
    let read = reader.read_line(&mut line)?;
    if read == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "no input available",
        ));
    }
    let trimmed = line.trim_end().len();
    line.truncate(trimmed);
    Ok(line)
}

/// One line from the process's stdin, for pipes and redirected input
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinLineReader;

impl StdinLineReader {
    fn read_line(&self) -> io::Result<String> {
        read_trimmed_line(&mut io::stdin().lock())
    }
}

impl SecretReader for StdinLineReader {
    fn read_secret(&self) -> io::Result<Zeroizing<String>> {
        self.read_line().map(Zeroizing::new)
    }
}

/// One line at a time from an arbitrary buffered reader
pub struct LineSecretReader<R> {
    reader: Mutex<R>,
}

impl<R: BufRead + Send> LineSecretReader<R> {
    /// Wrap a buffered reader
    pub fn new(reader: R) -> Self {
        Self {
            reader: Mutex::new(reader),
        }
    }

    fn read_line(&self) -> io::Result<String> {
        let mut reader = self
            .reader
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "secret reader poisoned"))?;
        read_trimmed_line(&mut *reader)
    }
}

impl<R: BufRead + Send> SecretReader for LineSecretReader<R> {
    fn read_secret(&self) -> io::Result<Zeroizing<String>> {
        self.read_line().map(Zeroizing::new)
    }
}

/// Source of passwords, passphrases and challenge answers
pub trait SecretPrompt: Send + Sync {
    /// Show `label` and read a secret without echo where possible
    fn read_secret(&self, label: &str) -> io::Result<Zeroizing<String>>;

    /// Show `label` and read a visible one-line answer
    fn read_answer(&self, label: &str) -> io::Result<String>;
}

/// Prompts on stderr and reads from the process's stdin
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinPrompt;

impl StdinPrompt {
    fn show(label: &str) {
        let mut stderr = io::stderr();
        let _ = write!(stderr, "{}", label);
        let _ = stderr.flush();
    }
}

impl SecretPrompt for StdinPrompt {
    fn read_secret(&self, label: &str) -> io::Result<Zeroizing<String>> {
        Self::show(label);
        if io::stdin().is_terminal() {
            TerminalSecretReader.read_secret()
        } else {
            StdinLineReader.read_secret()
        }
    }

    fn read_answer(&self, label: &str) -> io::Result<String> {
        Self::show(label);
        StdinLineReader.read_line()
    }
}

/// Answers prompts from a fixed script of lines
pub struct ScriptedPrompt {
    lines: LineSecretReader<io::Cursor<Vec<u8>>>,
}

impl ScriptedPrompt {
    /// Each entry answers one prompt, in order
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut script = String::new();
        for answer in answers {
            script.push_str(answer.as_ref());
            script.push('\n');
        }
        Self {
            lines: LineSecretReader::new(io::Cursor::new(script.into_bytes())),
        }
    }
}

impl SecretPrompt for ScriptedPrompt {
    fn read_secret(&self, _label: &str) -> io::Result<Zeroizing<String>> {
        self.lines.read_secret()
    }

    fn read_answer(&self, _label: &str) -> io::Result<String> {
        self.lines.read_line()
    }
}
