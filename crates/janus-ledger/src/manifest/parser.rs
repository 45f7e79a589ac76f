use std::path::PathBuf;

use janus_schema::{Capability, GitRef, Manifest, PackageRef, RefType, Source};

use super::ManifestError;
use super::lexer::{Token, TokenKind, tokenize, unescape};

/// Parse the text of a `janus.pkg` file.
///
/// # Errors
///
/// Returns a [`ManifestError`] carrying the offending line for malformed
/// input, or a dependency block without exactly one source.
pub fn parse_manifest(source: &str) -> Result<Manifest, ManifestError> {
    let tokens = tokenize(source)?;
    Parser { tokens, pos: 0 }.manifest()
}

struct Parser<'src> {
    tokens: Vec<Token<'src>>,
    pos: usize,
}

fn unexpected(token: &Token<'_>, expected: &'static str) -> ManifestError {
    ManifestError::Unexpected {
        line: token.line,
        expected,
        found: token.describe(),
    }
}

impl<'src> Parser<'src> {
    fn peek(&self) -> Option<Token<'src>> {
        self.tokens.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<Token<'src>> {
        let token = self.peek();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|t| t.kind)
    }

    fn skip_terminators(&mut self) {
        while matches!(self.peek_kind(), Some(TokenKind::Newline | TokenKind::Semi)) {
            self.pos += 1;
        }
    }

    fn at_node_end(&self) -> bool {
        matches!(
            self.peek_kind(),
            None | Some(TokenKind::Newline | TokenKind::Semi | TokenKind::RBrace)
        )
    }

    /// Consume the terminator of a node. A closing brace ends the node but
    /// belongs to the enclosing block.
    fn end_node(&mut self) -> Result<(), ManifestError> {
        match self.peek() {
            None => Ok(()),
            Some(t) if matches!(t.kind, TokenKind::Newline | TokenKind::Semi) => {
                self.pos += 1;
                Ok(())
            }
            Some(t) if t.kind == TokenKind::RBrace => Ok(()),
            Some(t) => Err(unexpected(&t, "end of line")),
        }
    }

    fn expect(
        &mut self,
        kind: TokenKind,
        expected: &'static str,
    ) -> Result<Token<'src>, ManifestError> {
        match self.bump() {
            Some(t) if t.kind == kind => Ok(t),
            Some(t) => Err(unexpected(&t, expected)),
            None => Err(ManifestError::UnexpectedEof { expected }),
        }
    }

    fn string(&mut self, expected: &'static str) -> Result<String, ManifestError> {
        let token = self.expect(TokenKind::Str, expected)?;
        unescape(&token)
    }

    /// A string, or a bare number kept as written (`version 1.0`).
    fn scalar(&mut self, expected: &'static str) -> Result<String, ManifestError> {
        match self.bump() {
            Some(t) if t.kind == TokenKind::Str => unescape(&t),
            Some(t) if t.kind == TokenKind::Number => Ok(t.text.to_string()),
            Some(t) => Err(unexpected(&t, expected)),
            None => Err(ManifestError::UnexpectedEof { expected }),
        }
    }

    fn skip_eq(&mut self) {
        if self.peek_kind() == Some(TokenKind::Eq) {
            self.pos += 1;
        }
    }

    /// Skip an unrecognized node, including any `{ ... }` block it carries.
    fn skip_node(&mut self) -> Result<(), ManifestError> {
        let mut depth = 0usize;
        loop {
            let Some(token) = self.peek() else {
                return if depth == 0 {
                    Ok(())
                } else {
                    Err(ManifestError::UnexpectedEof { expected: "'}'" })
                };
            };
            match token.kind {
                TokenKind::Newline | TokenKind::Semi if depth == 0 => {
                    self.pos += 1;
                    return Ok(());
                }
                TokenKind::RBrace if depth == 0 => return Ok(()),
                TokenKind::LBrace => {
                    depth += 1;
                    self.pos += 1;
                }
                TokenKind::RBrace => {
                    depth -= 1;
                    self.pos += 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                _ => self.pos += 1,
            }
        }
    }

    fn manifest(mut self) -> Result<Manifest, ManifestError> {
        let mut manifest = Manifest::default();

        loop {
            self.skip_terminators();
            let Some(token) = self.bump() else {
                break;
            };
            if token.kind != TokenKind::Ident {
                return Err(unexpected(&token, "a node name"));
            }

            match token.text {
                "name" => {
                    manifest.name = self.scalar("a project name")?;
                    self.end_node()?;
                }
                "version" => {
                    manifest.version = self.scalar("a version")?;
                    self.end_node()?;
                }
                "dependency" => {
                    manifest.dependencies.push(self.dependency(token.line)?);
                    self.end_node()?;
                }
                "dev-dependency" => {
                    manifest.dev_dependencies.push(self.dependency(token.line)?);
                    self.end_node()?;
                }
                other => {
                    tracing::trace!("Skipping unknown node '{}' on line {}", other, token.line);
                    self.skip_node()?;
                }
            }
        }

        Ok(manifest)
    }

    fn dependency(&mut self, line: usize) -> Result<PackageRef, ManifestError> {
        let name = self.string("a dependency name")?;
        self.expect(TokenKind::LBrace, "'{'")?;

        let mut source = None;
        let mut capabilities = Vec::new();

        loop {
            self.skip_terminators();
            let token = self
                .bump()
                .ok_or(ManifestError::UnexpectedEof { expected: "'}'" })?;
            match token.kind {
                TokenKind::RBrace => break,
                TokenKind::Ident => {}
                _ => return Err(unexpected(&token, "a directive or '}'")),
            }

            let parsed = match token.text {
                "git" => Some(self.git_source()?),
                "tar" => Some(self.tar_source()?),
                "path" => Some(Source::Path {
                    path: PathBuf::from(self.string("a path")?),
                }),
                "capability" => {
                    let capability = self.capability()?;
                    if capabilities
                        .iter()
                        .any(|c: &Capability| c.name == capability.name)
                    {
                        return Err(ManifestError::DuplicateCapability {
                            line: token.line,
                            dependency: name,
                            capability: capability.name,
                        });
                    }
                    capabilities.push(capability);
                    None
                }
                other => {
                    tracing::trace!(
                        "Skipping unknown directive '{}' in dependency '{}' on line {}",
                        other,
                        name,
                        token.line
                    );
                    self.skip_node()?;
                    continue;
                }
            };

            if let Some(parsed) = parsed {
                if source.is_some() {
                    return Err(ManifestError::DuplicateSource {
                        line: token.line,
                        dependency: name,
                    });
                }
                source = Some(parsed);
            }
            self.end_node()?;
        }

        let Some(source) = source else {
            return Err(ManifestError::MissingSource {
                line,
                dependency: name,
            });
        };

        Ok(PackageRef {
            name,
            source,
            capabilities,
        })
    }

    /// `git <url> [tag=|branch=|commit=]<ref>`; no ref means branch `main`,
    /// a bare ref is a tag.
    fn git_source(&mut self) -> Result<Source, ManifestError> {
        let url = self.string("a git URL")?;
        if self.at_node_end() {
            return Ok(Source::Git {
                url,
                reference: GitRef::default(),
            });
        }

        let ref_type = match self.peek() {
            Some(t) if t.kind == TokenKind::Ident => {
                self.pos += 1;
                let ref_type = RefType::from_qualifier(t.text)
                    .ok_or_else(|| unexpected(&t, "tag, branch or commit"))?;
                self.skip_eq();
                ref_type
            }
            _ => RefType::Tag,
        };
        let name = self.string("a git ref")?;

        Ok(Source::Git {
            url,
            reference: GitRef { ref_type, name },
        })
    }

    /// `tar <url> [checksum=<sha>]`
    fn tar_source(&mut self) -> Result<Source, ManifestError> {
        let url = self.string("a tarball URL")?;
        if self.at_node_end() {
            return Ok(Source::Tar {
                url,
                checksum: None,
            });
        }

        let key = self.expect(TokenKind::Ident, "checksum")?;
        if key.text != "checksum" {
            return Err(unexpected(&key, "checksum"));
        }
        self.skip_eq();
        let checksum = self.string("a checksum")?;

        Ok(Source::Tar {
            url,
            checksum: Some(checksum),
        })
    }

    /// `capability "name" key="value" "quoted key"="value" ...`
    fn capability(&mut self) -> Result<Capability, ManifestError> {
        let mut capability = Capability::new(self.string("a capability name")?);

        while !self.at_node_end() {
            let key = match self.bump() {
                Some(t) if t.kind == TokenKind::Ident => t.text.to_string(),
                Some(t) if t.kind == TokenKind::Str => unescape(&t)?,
                Some(t) => return Err(unexpected(&t, "a parameter name")),
                None => {
                    return Err(ManifestError::UnexpectedEof {
                        expected: "a parameter name",
                    });
                }
            };
            self.skip_eq();
            let value = self.scalar("a parameter value")?;
            capability.params.insert(key, value);
        }

        Ok(capability)
    }
}
