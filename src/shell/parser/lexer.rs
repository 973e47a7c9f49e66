use std::iter::Peekable;
use std::str::Chars;

#[derive(Debug, PartialEq, Clone)]
pub enum Token {
    Word(String),
    Redirect(RedirectOp),
    Pipe,
    And,
    Or,
    Semi,
    Background,
    EOF,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum RedirectOp {
    Input,       // <
    Output,      // >
    ErrorOutput, // 2>
}

pub struct Lexer<'a> {
    input: Peekable<Chars<'a>>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input: input.chars().peekable(),
        }
    }

    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace();

        match self.peek_char() {
            None => Token::EOF,
            Some(c) => match c {
                '|' => {
                    self.read_char();
                    if self.peek_char() == Some('|') {
                        self.read_char();
                        Token::Or
                    } else {
                        Token::Pipe
                    }
                }
                '&' => {
                    self.read_char();
                    if self.peek_char() == Some('&') {
                        self.read_char();
                        Token::And
                    } else {
                        Token::Background
                    }
                }
                ';' => {
                    self.read_char();
                    Token::Semi
                }
                '<' => {
                    self.read_char();
                    Token::Redirect(RedirectOp::Input)
                }
                '>' => {
                    self.read_char();
                    Token::Redirect(RedirectOp::Output)
                }
                '2' => {
                    self.read_char();
                    if self.peek_char() == Some('>') {
                        self.read_char();
                        Token::Redirect(RedirectOp::ErrorOutput)
                    } else {
                        self.read_word(String::from("2"))
                    }
                }
                '"' => self.read_quoted_string(),
                '\'' => self.read_quoted_string(),
                _ => self.read_word(String::new()),
            },
        }
    }

    fn read_char(&mut self) -> Option<char> {
        self.input.next()
    }

    fn peek_char(&mut self) -> Option<char> {
        self.input.peek().copied()
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek_char() {
            if !c.is_whitespace() {
                break;
            }
            self.read_char();
        }
    }

    fn read_word(&mut self, prefix: String) -> Token {
        let mut word = prefix;

        while let Some(c) = self.peek_char() {
            if c.is_whitespace() || ";<>|&".contains(c) {
                break;
            }
            word.push(self.read_char().unwrap_or_default());
        }

        Token::Word(word)
    }

    fn read_quoted_string(&mut self) -> Token {
        let quote = self.read_char().unwrap_or_default();
        let mut string = String::new();
        let mut escaped = false;

        while let Some(c) = self.read_char() {
            match (escaped, c) {
                (true, _) => {
                    string.push(c);
                    escaped = false;
                }
                (false, '\\') => escaped = true,
                (false, c) if c == quote => break,
                (false, c) => string.push(c),
            }
        }

        Token::Word(string)
    }
}
