use nix::unistd::Pid;

use super::lexer::RedirectOp;

/// How one command relates to the next node in the chain.
///
/// `Pipe` only ever appears on pipeline-interior links; the node after a
/// pipeline's last member carries the connector that decides what runs next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Connector {
    #[default]
    End,
    Sequence,
    And,
    Or,
    Pipe,
    Background,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirection {
    pub operator: RedirectOp,
    pub target: String,
}

/// One executable step of an input line.
#[derive(Debug, Clone, Default)]
pub struct Command {
    pub arguments: Vec<String>,
    pub redirections: Vec<Redirection>,
    pub background: bool,
    pub connector: Connector,
    pub pid: Option<Pid>,
    pub status: Option<i32>,
}

/// The full command list built from one input line. Nodes live in an owned
/// vector and are addressed by index, so connector evaluation can copy a
/// status from a predecessor without any back-pointers.
#[derive(Debug, Default)]
pub struct Chain {
    pub commands: Vec<Command>,
}

impl Chain {
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Index of the last member of the pipeline starting at `start`.
    pub fn pipeline_end(&self, start: usize) -> usize {
        pipeline_end(&self.commands, start)
    }
}

pub fn pipeline_end(commands: &[Command], start: usize) -> usize {
    let mut i = start;
    while i + 1 < commands.len() && commands[i].connector == Connector::Pipe {
        i += 1;
    }
    i
}
