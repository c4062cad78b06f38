use super::{describe, Parser};
use crate::ast::Metadata;
use crate::error::SyntaxError;
use crate::lexer::Token;

impl<'a> Parser<'a> {
    pub(super) fn parse_metadata(&mut self) -> Result<Metadata, SyntaxError> {
        let line = self.cur_line();
        let name = match self.peek().clone() {
            Token::Meta(m) => m,
            other => return Err(self.err(format!("expected metadata, got {}", describe(&other)))),
        };
        self.advance();
        self.expect(Token::Colon, &format!("':' after '@{}'", name))?;

        let item = match name.as_str() {
            "name" => Metadata::Name {
                value: self.take_text()?,
                line,
            },
            "description" => Metadata::Description {
                value: self.take_text()?,
                line,
            },
            "author" => Metadata::Author {
                value: self.take_text()?,
                line,
            },
            "date" => {
                let value = match self.peek().clone() {
                    Token::Date(d) | Token::Str(d) => {
                        self.advance();
                        d
                    }
                    other => {
                        return Err(self.err(format!("expected a date, got {}", describe(&other))))
                    }
                };
                Metadata::Date { value, line }
            }
            "tags" => Metadata::Tags {
                tags: self.parse_tag_list()?,
                line,
            },
            "data" => {
                let file = self.take_str()?;
                let format = if self.is_word("using") {
                    self.advance();
                    self.take_ident()?
                } else {
                    "csv".to_owned()
                };
                Metadata::Data { file, format, line }
            }
            "import" => Metadata::Import {
                path: self.take_str()?,
                line,
            },
            "remote" => {
                let url = self.take_str()?;
                self.expect_word("as")?;
                let alias = self.take_ident()?;
                Metadata::RemoteImport { url, alias, line }
            }
            other => {
                return Err(SyntaxError::parse(
                    line,
                    format!("unknown metadata '@{}'", other),
                ))
            }
        };
        self.expect_statement_end()?;
        Ok(item)
    }

    /// A quoted string or a single bare word.
    fn take_text(&mut self) -> Result<String, SyntaxError> {
        match self.peek().clone() {
            Token::Str(s) | Token::Word(s) => {
                self.advance();
                Ok(s)
            }
            other => Err(self.err(format!("expected text, got {}", describe(&other)))),
        }
    }

    fn parse_tag_list(&mut self) -> Result<Vec<String>, SyntaxError> {
        self.expect(Token::LBracket, "'[' to open tag list")?;
        let mut tags = Vec::new();
        while self.peek() != &Token::RBracket {
            tags.push(self.take_text()?);
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::RBracket, "']' to close tag list")?;
        Ok(tags)
    }
}
