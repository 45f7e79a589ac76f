//! In-place edits of `janus.pkg` text.
//!
//! Re-rendering a whole manifest would drop comments and every node the
//! parser skips. Edits here rewrite one dependency block and copy the rest
//! of the file through byte for byte.

use janus_schema::PackageRef;

use super::ManifestError;
use super::lexer::{Token, TokenKind, tokenize, unescape};
use super::parser::parse_manifest;
use super::render::render_dependency;

/// Byte ranges of one top-level node.
struct NodeSpan<'src> {
    /// First byte of the node's line when only whitespace precedes it.
    line_start: usize,
    /// First byte of the node's first token.
    start: usize,
    /// One past the node's last token (its closing brace, for blocks).
    end: usize,
    /// One past the node's terminator, if it has one.
    line_end: usize,
    keyword: &'src str,
    name: Option<String>,
}

fn is_dependency(span: &NodeSpan<'_>, name: &str) -> bool {
    matches!(span.keyword, "dependency" | "dev-dependency") && span.name.as_deref() == Some(name)
}

fn top_level_nodes<'src>(
    source: &str,
    tokens: &[Token<'src>],
) -> Result<Vec<NodeSpan<'src>>, ManifestError> {
    let mut nodes = Vec::new();
    let mut pos = 0;

    loop {
        while matches!(
            tokens.get(pos).map(|t| t.kind),
            Some(TokenKind::Newline | TokenKind::Semi)
        ) {
            pos += 1;
        }
        let Some(first) = tokens.get(pos).copied() else {
            break;
        };

        let name = match tokens.get(pos + 1) {
            Some(t)
                if t.kind == TokenKind::Str
                    && matches!(first.text, "dependency" | "dev-dependency") =>
            {
                Some(unescape(t)?)
            }
            _ => None,
        };

        let mut depth = 0usize;
        let mut end = first.end;
        let mut line_end = None;
        while let Some(token) = tokens.get(pos).copied() {
            pos += 1;
            match token.kind {
                TokenKind::Newline | TokenKind::Semi if depth == 0 => {
                    line_end = Some(token.end);
                    break;
                }
                TokenKind::LBrace => depth += 1,
                TokenKind::RBrace => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        end = token.end;
                        if let Some(next) = tokens
                            .get(pos)
                            .filter(|t| matches!(t.kind, TokenKind::Newline | TokenKind::Semi))
                        {
                            line_end = Some(next.end);
                            pos += 1;
                        }
                        break;
                    }
                }
                _ => {}
            }
            end = token.end;
        }

        let line_start = source[..first.start].rfind('\n').map_or(0, |i| i + 1);
        let line_start = if source[line_start..first.start].trim().is_empty() {
            line_start
        } else {
            first.start
        };

        nodes.push(NodeSpan {
            line_start,
            start: first.start,
            end,
            line_end: line_end.unwrap_or(end),
            keyword: first.text,
            name,
        });
    }

    Ok(nodes)
}

/// Declare `dep` in the manifest text `source`, keeping everything else.
///
/// The first `dependency` or `dev-dependency` block with the same name is
/// rewritten in place and any later ones are removed. Without one, the
/// block is appended. Comments and unknown nodes are left untouched.
///
/// # Errors
///
/// Returns the [`ManifestError`] of `source` if it does not parse.
pub fn upsert_dependency(
    source: &str,
    dep: &PackageRef,
    is_dev: bool,
) -> Result<String, ManifestError> {
    parse_manifest(source)?;
    let tokens = tokenize(source)?;
    let nodes = top_level_nodes(source, &tokens)?;

    let block = render_dependency(dep, is_dev);
    let mut matches = nodes.iter().filter(|n| is_dependency(n, &dep.name));

    let Some(first) = matches.next() else {
        let mut out = source.to_string();
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        if !out.trim().is_empty() {
            out.push('\n');
        }
        out.push_str(&block);
        return Ok(out);
    };

    let mut out = String::with_capacity(source.len() + block.len());
    out.push_str(&source[..first.start]);
    out.push_str(block.trim_end_matches('\n'));
    let mut copied_to = first.end;
    for duplicate in matches {
        out.push_str(&source[copied_to..duplicate.line_start]);
        copied_to = duplicate.line_end;
    }
    out.push_str(&source[copied_to..]);
    Ok(out)
}
