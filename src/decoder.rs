use rustc_hash::FxHashSet;
use std::fmt;
use std::io::{ErrorKind, Write};
use std::process::{Command, Stdio};

/// Node names as raw bytes, exactly as the block codec reports them.
pub type NodeSet = FxHashSet<Vec<u8>>;

/// Why a single block could not be turned into node names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeFailure(pub String);

impl fmt::Display for DecodeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for DecodeFailure {}

/// Turns one serialized map block into the set of node names it contains.
///
/// Implementations must be pure: the same bytes always give the same set.
/// One decoder is shared by reference between all workers.
pub trait BlockDecoder: Sync {
    fn decode(&self, block: &[u8]) -> Result<NodeSet, DecodeFailure>;
}

impl<F> BlockDecoder for F
where
    F: Fn(&[u8]) -> Result<NodeSet, DecodeFailure> + Sync,
{
    fn decode(&self, block: &[u8]) -> Result<NodeSet, DecodeFailure> {
        self(block)
    }
}

/// Runs an external block codec once per block.
///
/// The raw block is written to the program's stdin; the program prints one
/// node name per line on stdout and exits with status 0.
#[derive(Debug, Clone)]
pub struct CommandDecoder {
    program: String,
    args: Vec<String>,
}

impl CommandDecoder {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl BlockDecoder for CommandDecoder {
    fn decode(&self, block: &[u8]) -> Result<NodeSet, DecodeFailure> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| DecodeFailure(format!("cannot run {}: {}", self.program, e)))?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| DecodeFailure("decoder stdin unavailable".to_string()))?;

        // Feed stdin from a second thread so a chatty decoder cannot deadlock on a full pipe.
        let (output, written) = std::thread::scope(|s| {
            let writer = s.spawn(move || stdin.write_all(block));
            let output = child.wait_with_output();
            (output, writer.join())
        });

        let output = output
            .map_err(|e| DecodeFailure(format!("waiting for {}: {}", self.program, e)))?;
        if !output.status.success() {
            return Err(DecodeFailure(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        match written {
            Ok(Ok(())) => {}
            Ok(Err(e)) if e.kind() == ErrorKind::BrokenPipe => {}
            Ok(Err(e)) => return Err(DecodeFailure(format!("writing block: {}", e))),
            Err(_) => return Err(DecodeFailure("stdin writer panicked".to_string())),
        }

        Ok(parse_node_lines(&output.stdout))
    }
}

/// Split decoder output on `\n`. Names are kept byte-exact; empty lines are dropped.
pub fn parse_node_lines(stdout: &[u8]) -> NodeSet {
    stdout
        .split(|b| *b == b'\n')
        .filter(|line| !line.is_empty())
        .map(<[u8]>::to_vec)
        .collect()
}
