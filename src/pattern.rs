//! Substitution of `[token]`, `${variable}` and `@{param}` placeholders in
//! repository and retrieve patterns.
//!
//! Optional segments such as `(-[branch])` are emitted only when every known
//! token inside them has a non-empty value. A segment whose tokens are all
//! unknown is kept verbatim, parentheses included.

use std::{collections::HashMap, sync::OnceLock};

use regex_lite::Regex;
use thiserror::Error;

use crate::model::{Artifact, ModuleRevisionId};

pub const CONF_KEY: &str = "conf";
pub const TYPE_KEY: &str = "type";
pub const EXT_KEY: &str = "ext";
pub const ARTIFACT_KEY: &str = "artifact";
pub const BRANCH_KEY: &str = "branch";
pub const REVISION_KEY: &str = "revision";
pub const MODULE_KEY: &str = "module";
pub const ORGANISATION_KEY: &str = "organisation";
pub const ORGANISATION_KEY2: &str = "organization";
pub const ORGANISATION_PATH_KEY: &str = "orgPath";
pub const ORIGINAL_ARTIFACTNAME_KEY: &str = "originalname";

const DEFAULT_TYPE: &str = "jar";
const DEFAULT_CONF: &str = "default";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PatternError {
    #[error("cyclic variable definition: cycle = [{}]", .0.join(", "))]
    CyclicVariable(Vec<String>),
    #[error("invalid start of optional part: optional parts cannot be nested in {0}")]
    NestedOptional(String),
    #[error("invalid optional part: optional parts cannot be in tokens in {0}")]
    OptionalInToken(String),
    #[error("invalid end of optional part: no optional part started in {0}")]
    UnexpectedClose(String),
    #[error("invalid start of token: tokens cannot be nested in {0}")]
    TokenInToken(String),
    #[error("invalid end of token: no token started in {0}")]
    UnexpectedTokenClose(String),
    #[error("missing end of token in {0}")]
    UnclosedToken(String),
    #[error("missing end of optional part in {0}")]
    UnclosedOptional(String),
    #[error("illegal path traversal in `{path}` substituted from `{pattern}`")]
    PathTraversal { pattern: String, path: String },
}

fn variable_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{(.*?)\}").unwrap())
}

fn param_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"@\{(.*?)\}").unwrap())
}

/// Replaces `${name}` recursively. Unknown variables are left untouched.
pub fn substitute_variables(
    pattern: &str,
    variables: &HashMap<String, String>,
) -> Result<String, PatternError> {
    substitute_recursively(pattern, variables, variable_pattern(), &mut vec![])
}

/// Replaces `@{name}` recursively. Unknown params are left untouched.
pub fn substitute_params(
    pattern: &str,
    params: &HashMap<String, String>,
) -> Result<String, PatternError> {
    substitute_recursively(pattern, params, param_pattern(), &mut vec![])
}

fn substitute_recursively(
    pattern: &str,
    values: &HashMap<String, String>,
    placeholder: &Regex,
    stack: &mut Vec<String>,
) -> Result<String, PatternError> {
    let mut result = String::with_capacity(pattern.len());
    let mut last = 0;
    for captures in placeholder.captures_iter(pattern) {
        let Some(whole) = captures.get(0) else {
            continue;
        };
        let name = captures.get(1).map_or("", |m| m.as_str());
        result.push_str(&pattern[last..whole.start()]);
        match values.get(name) {
            Some(value) => {
                if let Some(index) = stack.iter().position(|v| v == name) {
                    return Err(PatternError::CyclicVariable(stack[index..].to_vec()));
                }
                stack.push(name.to_owned());
                let substituted = substitute_recursively(value, values, placeholder, stack)?;
                stack.pop();
                result.push_str(&substituted);
            }
            None => result.push_str(whole.as_str()),
        }
        last = whole.end();
    }
    result.push_str(&pattern[last..]);
    Ok(result)
}

/// Replaces `[token]` placeholders. Not recursive; unknown tokens stay as
/// `[token]` so callers can still locate them.
pub fn substitute_tokens(
    pattern: &str,
    tokens: &HashMap<String, String>,
) -> Result<String, PatternError> {
    let error = |make: fn(String) -> PatternError| Err(make(pattern.to_owned()));

    let mut buffer = String::with_capacity(pattern.len());
    let mut optional: Option<String> = None;
    let mut token: Option<String> = None;
    let mut optional_saw_known = false;
    let mut optional_all_valued = true;

    for ch in pattern.chars() {
        match ch {
            '(' => {
                if token.is_some() {
                    return error(PatternError::OptionalInToken);
                }
                if optional.is_some() {
                    return error(PatternError::NestedOptional);
                }
                optional = Some(String::new());
                optional_saw_known = false;
                optional_all_valued = true;
            }
            ')' => {
                if token.is_some() {
                    return error(PatternError::OptionalInToken);
                }
                let Some(part) = optional.take() else {
                    return error(PatternError::UnexpectedClose);
                };
                if !optional_saw_known {
                    buffer.push('(');
                    buffer.push_str(&part);
                    buffer.push(')');
                } else if optional_all_valued {
                    buffer.push_str(&part);
                }
            }
            '[' => {
                if token.is_some() {
                    return error(PatternError::TokenInToken);
                }
                token = Some(String::new());
            }
            ']' => {
                let Some(name) = token.take() else {
                    return error(PatternError::UnexpectedTokenClose);
                };
                let value = match tokens.get(&name) {
                    Some(value) => {
                        if optional.is_some() {
                            optional_saw_known = true;
                            optional_all_valued &= !value.is_empty();
                        }
                        value.clone()
                    }
                    None => format!("[{}]", name),
                };
                optional.as_mut().unwrap_or(&mut buffer).push_str(&value);
            }
            _ => match token.as_mut() {
                Some(name) => name.push(ch),
                None => optional.as_mut().unwrap_or(&mut buffer).push(ch),
            },
        }
    }

    if token.is_some() {
        return error(PatternError::UnclosedToken);
    }
    if optional.is_some() {
        return error(PatternError::UnclosedOptional);
    }
    Ok(buffer)
}

/// Literal prefix of `pattern` before its first token or optional part.
pub fn token_root(pattern: &str) -> &str {
    match pattern.find('[') {
        None => pattern,
        Some(index) => {
            let index = pattern.find('(').map_or(index, |optional| optional.min(index));
            &pattern[..index]
        }
    }
}

pub fn first_token(pattern: &str) -> Option<&str> {
    let start = pattern.find('[')?;
    let end = pattern[start..].find(']')?;
    Some(&pattern[start + 1..start + end])
}

/// Token values describing a module revision.
pub fn module_tokens(mrid: &ModuleRevisionId) -> HashMap<String, String> {
    let mut tokens = HashMap::new();
    for (key, value) in mrid.extra_attributes() {
        tokens.insert(strip_namespace(key).to_owned(), value.clone());
    }
    tokens.insert(ORGANISATION_KEY.to_owned(), mrid.organisation().to_owned());
    tokens.insert(ORGANISATION_KEY2.to_owned(), mrid.organisation().to_owned());
    tokens.insert(
        ORGANISATION_PATH_KEY.to_owned(),
        mrid.organisation().replace('.', "/"),
    );
    tokens.insert(MODULE_KEY.to_owned(), mrid.name().to_owned());
    tokens.insert(
        BRANCH_KEY.to_owned(),
        mrid.branch().unwrap_or_default().to_owned(),
    );
    tokens.insert(REVISION_KEY.to_owned(), mrid.revision().to_owned());
    tokens.insert(ARTIFACT_KEY.to_owned(), mrid.name().to_owned());
    tokens.insert(TYPE_KEY.to_owned(), DEFAULT_TYPE.to_owned());
    tokens.insert(EXT_KEY.to_owned(), DEFAULT_TYPE.to_owned());
    tokens.insert(CONF_KEY.to_owned(), DEFAULT_CONF.to_owned());
    tokens
}

/// Token values describing one artifact, optionally within a configuration.
pub fn artifact_tokens(artifact: &Artifact, conf: Option<&str>) -> HashMap<String, String> {
    let mut tokens = module_tokens(&artifact.mrid);
    for (key, value) in &artifact.extra {
        tokens.insert(strip_namespace(key).to_owned(), value.clone());
    }
    tokens.insert(ARTIFACT_KEY.to_owned(), artifact.name.clone());
    tokens.insert(TYPE_KEY.to_owned(), artifact.kind.clone());
    tokens.insert(EXT_KEY.to_owned(), artifact.ext.clone());
    tokens.insert(
        ORIGINAL_ARTIFACTNAME_KEY.to_owned(),
        if artifact.ext.is_empty() {
            artifact.name.clone()
        } else {
            format!("{}.{}", artifact.name, artifact.ext)
        },
    );
    tokens.insert(CONF_KEY.to_owned(), conf.unwrap_or(DEFAULT_CONF).to_owned());
    tokens
}

fn strip_namespace(key: &str) -> &str {
    key.rsplit_once(':').map_or(key, |(_, name)| name)
}

/// Full substitution for a path: variables, then tokens, then the traversal
/// guard on everything past the pattern's literal root.
pub fn substitute(
    pattern: &str,
    tokens: &HashMap<String, String>,
    variables: &HashMap<String, String>,
) -> Result<String, PatternError> {
    let pattern = substitute_variables(pattern, variables)?;
    let result = substitute_tokens(&pattern, tokens)?;
    check_path_traversal(&pattern, tokens, &result)?;
    Ok(result)
}

fn check_path_traversal(
    pattern: &str,
    tokens: &HashMap<String, String>,
    result: &str,
) -> Result<(), PatternError> {
    // Tokens never produce this character, so the first difference between
    // the two renderings marks the end of the literal root.
    let dummy: HashMap<String, String> =
        tokens.keys().map(|k| (k.clone(), "\u{1f}".to_owned())).collect();
    let empty: HashMap<String, String> =
        tokens.keys().map(|k| (k.clone(), String::new())).collect();
    let with_dummy = substitute_tokens(pattern, &dummy)?;
    let with_empty = substitute_tokens(pattern, &empty)?;

    let mut root_len = with_dummy
        .char_indices()
        .zip(with_empty.chars())
        .take_while(|((_, a), b)| a == b)
        .last()
        .map_or(0, |((index, ch), _)| index + ch.len_utf8());
    if !result.starts_with(&with_dummy[..root_len]) {
        root_len = 0;
    }

    let tail = format!("/{}", result[root_len..].replace('\\', "/"));
    if tail.contains("/../") || tail.ends_with("/..") {
        return Err(PatternError::PathTraversal {
            pattern: pattern.to_owned(),
            path: result.to_owned(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn map(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn substitute_simple_tokens() {
        let tokens = map(&[
            ("organisation", "apache"),
            ("module", "ant"),
            ("revision", "1.7.0"),
            ("artifact", "ant"),
            ("ext", "jar"),
        ]);
        assert_eq!(
            substitute_tokens("[organisation]/[module]/[revision]/[artifact].[ext]", &tokens)
                .unwrap(),
            "apache/ant/1.7.0/ant.jar"
        );
        assert_eq!(
            substitute_tokens("lib/[unknown]/[module]", &tokens).unwrap(),
            "lib/[unknown]/ant"
        );
    }

    #[test]
    fn optional_segment_law() {
        let pattern = "x(-[rev])";
        assert_eq!(substitute_tokens(pattern, &map(&[])).unwrap(), "x(-[rev])");
        assert_eq!(
            substitute_tokens(pattern, &map(&[("rev", "")])).unwrap(),
            "x"
        );
        assert_eq!(
            substitute_tokens(pattern, &map(&[("rev", "1.0")])).unwrap(),
            "x-1.0"
        );
        assert_eq!(
            substitute_tokens("a(-[x]-[y])", &map(&[("x", "1"), ("y", "")])).unwrap(),
            "a"
        );
        assert_eq!(substitute_tokens("a(b)c", &map(&[])).unwrap(), "a(b)c");
    }

    #[test]
    fn malformed_patterns() {
        let tokens = map(&[]);
        assert_eq!(
            substitute_tokens("a((b))", &tokens),
            Err(PatternError::NestedOptional("a((b))".to_owned()))
        );
        assert_eq!(
            substitute_tokens("a)b", &tokens),
            Err(PatternError::UnexpectedClose("a)b".to_owned()))
        );
        assert_eq!(
            substitute_tokens("[a[b]]", &tokens),
            Err(PatternError::TokenInToken("[a[b]]".to_owned()))
        );
        assert_eq!(
            substitute_tokens("a]", &tokens),
            Err(PatternError::UnexpectedTokenClose("a]".to_owned()))
        );
        assert_eq!(
            substitute_tokens("[a", &tokens),
            Err(PatternError::UnclosedToken("[a".to_owned()))
        );
        assert_eq!(
            substitute_tokens("(a", &tokens),
            Err(PatternError::UnclosedOptional("(a".to_owned()))
        );
        assert_eq!(
            substitute_tokens("[a(b]", &tokens),
            Err(PatternError::OptionalInToken("[a(b]".to_owned()))
        );
    }

    #[test]
    fn substitution_is_idempotent() {
        let tokens = map(&[("module", "ant"), ("ext", "jar")]);
        let once = substitute_tokens("lib/$dollar\\[module].[ext]", &tokens).unwrap();
        let twice = substitute_tokens(&once, &tokens).unwrap();
        assert_eq!(once, "lib/$dollar\\ant.jar");
        assert_eq!(once, twice);
    }

    #[test]
    fn variables_are_recursive() {
        let variables = map(&[("base", "${home}/repo"), ("home", "/opt")]);
        assert_eq!(
            substitute_variables("${base}/[module] ${missing}", &variables).unwrap(),
            "/opt/repo/[module] ${missing}"
        );
    }

    #[test]
    fn cyclic_variables_are_detected() {
        let variables = map(&[("a", "${b}"), ("b", "${a}")]);
        let error = substitute_variables("${a}", &variables).unwrap_err();
        assert_eq!(
            error,
            PatternError::CyclicVariable(vec!["a".to_owned(), "b".to_owned()])
        );
        assert_eq!(
            error.to_string(),
            "cyclic variable definition: cycle = [a, b]"
        );
    }

    #[test]
    fn params_use_at_sign() {
        let params = map(&[("major", "1")]);
        assert_eq!(
            substitute_params("@{major}\\.\\d+ ${major}", &params).unwrap(),
            "1\\.\\d+ ${major}"
        );
    }

    #[test]
    fn token_root_and_first_token() {
        assert_eq!(token_root("lib/[conf]/[artifact].[ext]"), "lib/");
        assert_eq!(token_root("lib/(x-[conf])/[artifact]"), "lib/");
        assert_eq!(token_root("lib/plain.jar"), "lib/plain.jar");
        assert_eq!(first_token("lib/[conf]/[artifact]"), Some("conf"));
        assert_eq!(first_token("lib/plain.jar"), None);
    }

    #[test]
    fn path_traversal_is_rejected_after_root() {
        let mrid = ModuleRevisionId::of("acme", "..", "1.0");
        let tokens = module_tokens(&mrid);
        let error = substitute("lib/[module]/x.jar", &tokens, &HashMap::new()).unwrap_err();
        assert!(matches!(error, PatternError::PathTraversal { .. }));

        let mrid = ModuleRevisionId::of("acme", "core", "1.0");
        let tokens = module_tokens(&mrid);
        assert_eq!(
            substitute("../lib/[module].jar", &tokens, &HashMap::new()).unwrap(),
            "../lib/core.jar"
        );
        let trailing = ModuleRevisionId::of("acme", "core", "..");
        assert!(substitute(
            "lib/[module]/[revision]",
            &module_tokens(&trailing),
            &HashMap::new()
        )
        .is_err());
    }

    #[test]
    fn artifact_tokens_include_conf_and_org_path() {
        let mrid = ModuleRevisionId::of("org.acme", "core", "2.0");
        let artifact = Artifact::new(mrid, Utc::now(), "core-api", "source", "zip");
        let tokens = artifact_tokens(&artifact, Some("compile"));
        assert_eq!(
            substitute(
                "[orgPath]/[conf]/[artifact]-[revision](-[branch]).[ext]",
                &tokens,
                &HashMap::new()
            )
            .unwrap(),
            "org/acme/compile/core-api-2.0.zip"
        );
        assert_eq!(tokens.get("originalname").unwrap(), "core-api.zip");
    }
}
