// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg(test)]

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use test_generator::test_resources;
use tfscope::unstable::*;

fn get_tokens(source: &Source) -> Result<Vec<Token>> {
    let mut tokens = vec![];
    let mut lex = Lexer::new(source);
    loop {
        let tok = lex.next_token()?;
        tokens.push(tok.clone());
        if tok.0 == TokenKind::Eof {
            break;
        }
    }

    Ok(tokens)
}

// Checks that the caret of a message printed for the token points at the
// token text.
fn check_loc(tok: &Token) -> Result<()> {
    if matches!(tok.0, TokenKind::Newline | TokenKind::Eof) {
        return Ok(());
    }
    let msg = tok.1.message("", "");
    let lines: Vec<&str> = msg.split('\n').collect();
    let source_line = lines[3];
    let caret = match lines[4].find('^') {
        Some(idx) => idx,
        None => bail!("could not find caret for {tok:?} {msg}"),
    };
    let rest: String = source_line.chars().skip(caret).collect();
    let text = tok.1.text().split('\n').next().unwrap_or_default();
    if !rest.starts_with(text) {
        bail!("location mismatch for {tok:?} {msg}\n{text}\n{rest}");
    }
    Ok(())
}

#[derive(Serialize, Deserialize, PartialEq, Debug)]
struct Case {
    pub hcl: String,
    pub note: String,
    #[serde(default)]
    pub tokens: Vec<String>,
    pub kinds: Option<Vec<String>>,
    pub error: Option<String>,
}

#[derive(Serialize, Deserialize, PartialEq, Debug)]
struct Test {
    cases: Vec<Case>,
}

fn yaml_test_impl(file: &str) -> Result<()> {
    println!("\nrunning {file}");

    let yaml = std::fs::read_to_string(file)?;
    let test: Test = serde_yaml::from_str(&yaml)?;

    for case in &test.cases {
        let source = Source::from_contents("case.tf".to_string(), case.hcl.clone())?;

        print!("case {} ", &case.note);

        match get_tokens(&source) {
            Ok(_) if case.error.is_some() => bail!("lexing succeeded for an error case"),
            Ok(tokens) => {
                for (idx, tok) in tokens.iter().enumerate() {
                    if idx >= case.tokens.len() {
                        break;
                    }
                    assert_eq!(
                        tok.1.text(),
                        case.tokens[idx],
                        "{} Expected token `{}` not found",
                        tok.1.message("mismatch-error", &case.tokens[idx]),
                        &case.tokens[idx]
                    );

                    if let Some(k) = &case.kinds {
                        if idx < k.len() {
                            assert_eq!(
                                format!("{:?}", tok.0),
                                k[idx],
                                "{}",
                                tok.1.message("mismatch-error", "token kind mismatch")
                            );
                        }
                    }

                    check_loc(tok)?;
                }
                assert_eq!(
                    tokens.len(),
                    case.tokens.len(),
                    "\n. Token count mismatch.\nLexed tokens:{tokens:?}"
                );
            }
            Err(actual) => match &case.error {
                Some(expected) => {
                    let actual = actual.to_string();
                    if !actual.contains(expected) {
                        bail!("Error message\n`{actual}\n`\ndoes not contain `{expected}`");
                    }
                }
                _ => return Err(actual),
            },
        }

        println!("passed");
    }
    println!("{} cases passed.", test.cases.len());
    Ok(())
}

#[test_resources("tests/lexer/cases/*.yaml")]
fn run(path: &str) {
    yaml_test_impl(path).unwrap()
}

#[test]
fn positions_are_one_based() -> Result<()> {
    let source = Source::from_contents("pos.tf".to_string(), "a = 1\n  bé = 2\n".to_string())?;
    assert_eq!(source.position(0), (1, 1));
    // `=` after the two-character identifier on the second line.
    assert_eq!(source.position(12), (2, 6));
    assert_eq!(source.line(1), "  bé = 2");
    Ok(())
}

#[test]
fn lexer_over_a_range() -> Result<()> {
    let source = Source::from_contents("range.tf".to_string(), "x = \"${a + b}\"".to_string())?;
    // The interpolation `a + b` starts at byte 7.
    let mut lex = Lexer::new_range(&source, 7, 12);
    let mut texts = vec![];
    loop {
        let tok = lex.next_token()?;
        if tok.0 == TokenKind::Eof {
            break;
        }
        texts.push(tok.1.text().to_string());
        assert_eq!(tok.1.line, 1);
    }
    assert_eq!(texts, ["a", "+", "b"]);
    Ok(())
}

#[test]
fn error_messages_point_at_the_location() -> Result<()> {
    let source = Source::from_contents("err.tf".to_string(), "a = 1\nb = $\n".to_string())?;
    let err = match get_tokens(&source) {
        Ok(_) => bail!("expected an error"),
        Err(e) => e.to_string(),
    };
    assert!(err.contains("--> err.tf:2:5"), "{err}");
    assert!(err.contains("invalid character"), "{err}");
    Ok(())
}
