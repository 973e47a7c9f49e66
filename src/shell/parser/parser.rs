use std::fmt;

use super::ast::{Chain, Command, Connector, Redirection};
use super::lexer::{Lexer, Token};

#[derive(Debug, PartialEq, Eq)]
pub enum ParseError {
    /// A redirection operator with no target word after it.
    MissingRedirectTarget,
    /// A connector with no command in front of it.
    MissingCommand,
    /// The line ended right after `&&`, `||` or `|`.
    TrailingConnector,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::MissingRedirectTarget => {
                write!(f, "expected a path after redirection operator")
            }
            ParseError::MissingCommand => write!(f, "expected a command"),
            ParseError::TrailingConnector => write!(f, "unexpected end of line after connector"),
        }
    }
}

impl std::error::Error for ParseError {}

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current_token: Token,
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a str) -> Self {
        let mut lexer = Lexer::new(input);
        let current_token = lexer.next_token();
        Parser {
            lexer,
            current_token,
        }
    }

    fn next_token(&mut self) {
        self.current_token = self.lexer.next_token();
    }

    /// Consume all tokens and build the command chain for one input line.
    ///
    /// A failed line produces no chain at all, so nothing of it ever runs.
    pub fn parse_chain(&mut self) -> Result<Chain, ParseError> {
        let mut chain = Chain::default();
        // Whether the chain's tail is still collecting words.
        let mut open = false;

        loop {
            match &self.current_token {
                Token::EOF => break,
                Token::Word(word) => {
                    let word = word.clone();
                    self.next_token();
                    if !open {
                        chain.commands.push(Command::default());
                        open = true;
                    }
                    if let Some(command) = chain.commands.last_mut() {
                        command.arguments.push(word);
                    }
                }
                Token::Redirect(operator) => {
                    let operator = *operator;
                    self.next_token();
                    let target = match &self.current_token {
                        Token::Word(target) => target.clone(),
                        _ => return Err(ParseError::MissingRedirectTarget),
                    };
                    self.next_token();
                    if !open {
                        chain.commands.push(Command::default());
                        open = true;
                    }
                    if let Some(command) = chain.commands.last_mut() {
                        command.redirections.push(Redirection { operator, target });
                    }
                }
                Token::Pipe | Token::And | Token::Or | Token::Semi | Token::Background => {
                    let connector = match self.current_token {
                        Token::Pipe => Connector::Pipe,
                        Token::And => Connector::And,
                        Token::Or => Connector::Or,
                        Token::Semi => Connector::Sequence,
                        _ => Connector::Background,
                    };
                    self.next_token();
                    match chain.commands.last_mut() {
                        Some(command) if open && !command.arguments.is_empty() => {
                            command.connector = connector;
                        }
                        _ => return Err(ParseError::MissingCommand),
                    }
                    open = false;
                    if connector == Connector::Background {
                        Self::mark_background(&mut chain.commands);
                    }
                }
            }
        }

        match chain.commands.last_mut() {
            None => {}
            Some(last) if open => {
                // A command that is only redirections has nothing to run.
                if last.arguments.is_empty() {
                    return Err(ParseError::MissingCommand);
                }
            }
            Some(last) => match last.connector {
                // A trailing `;` means the same as no connector at all.
                Connector::Sequence => last.connector = Connector::End,
                Connector::Background | Connector::End => {}
                Connector::Pipe | Connector::And | Connector::Or => {
                    return Err(ParseError::TrailingConnector)
                }
            },
        }
        Ok(chain)
    }

    /// A `&` detaches the whole `&&`/`||` run before it, not just the last
    /// pipeline: walk backward until the previous `;` or `&` boundary.
    fn mark_background(commands: &mut [Command]) {
        let last = commands.len() - 1;
        commands[last].background = true;
        for j in (0..last).rev() {
            match commands[j].connector {
                Connector::Sequence | Connector::Background => break,
                _ => commands[j].background = true,
            }
        }
    }
}
