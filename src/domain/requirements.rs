//! Pinned requirements list exported from the pipenv lock

use serde::Serialize;

use crate::error::{ShipError, ShipResult};

/// Options that may appear in an exported requirements file
const PASSTHROUGH_OPTIONS: &[&str] = &[
    "-i",
    "--index-url",
    "--extra-index-url",
    "--trusted-host",
];

/// One `name==version` entry
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Requirement {
    pub name: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marker: Option<String>,
}

/// A requirements file in which every entry is an exact pin
#[derive(Clone, Debug)]
pub struct PinnedRequirements {
    pub entries: Vec<Requirement>,
    text: String,
}

impl PinnedRequirements {
    /// Validate exported requirements text.
    ///
    /// Fails on the first entry that is not an exact `==`/`===` pin.
    pub fn parse(text: &str) -> ShipResult<Self> {
        let mut entries = Vec::new();

        for (line_no, line) in logical_lines(text) {
            let line = strip_comment(&line);
            if line.is_empty() {
                continue;
            }

            if line.starts_with('-') {
                let option = line
                    .split(|c: char| c == '=' || c.is_whitespace())
                    .next()
                    .unwrap_or_default();
                if PASSTHROUGH_OPTIONS.contains(&option) {
                    continue;
                }
                return Err(ShipError::UnpinnedRequirement { line_no, line });
            }

            let requirement = parse_pin(&line)
                .ok_or_else(|| ShipError::UnpinnedRequirement { line_no, line: line.clone() })?;
            entries.push(requirement);
        }

        Ok(Self {
            entries,
            text: text.to_string(),
        })
    }

    /// The validated text, byte for byte as exported
    pub fn as_text(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Join `\` continuations, keeping the number of the first physical line
fn logical_lines(text: &str) -> Vec<(usize, String)> {
    let mut lines = Vec::new();
    let mut current: Option<(usize, String)> = None;

    for (idx, raw) in text.lines().enumerate() {
        let trimmed = raw.trim();
        let (content, continues) = match trimmed.strip_suffix('\\') {
            Some(rest) => (rest.trim_end(), true),
            None => (trimmed, false),
        };

        let entry = current.get_or_insert_with(|| (idx + 1, String::new()));
        if !entry.1.is_empty() && !content.is_empty() {
            entry.1.push(' ');
        }
        entry.1.push_str(content);

        if !continues {
            lines.extend(current.take());
        }
    }
    lines.extend(current);
    lines
}

fn strip_comment(line: &str) -> String {
    let line = if line.starts_with('#') {
        ""
    } else {
        match line.find(" #") {
            Some(i) => &line[..i],
            None => line,
        }
    };
    line.trim().to_string()
}

fn parse_pin(line: &str) -> Option<Requirement> {
    let (spec, marker) = match line.split_once(';') {
        Some((spec, marker)) => (spec, Some(marker)),
        None => (line, None),
    };

    // Drop trailing `--hash=...` options
    let spec = spec.split_whitespace().filter(|t| !t.starts_with("--hash")).collect::<Vec<_>>();
    let marker = marker
        .map(|m| {
            m.split_whitespace()
                .take_while(|t| !t.starts_with("--hash"))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|m| !m.is_empty());
    let spec = spec.join("");

    let (name, version) = match spec.split_once("===") {
        Some(parts) => parts,
        None => spec.split_once("==")?,
    };

    let base_name = match name.split_once('[') {
        Some((base, extras)) if extras.ends_with(']') => base,
        Some(_) => return None,
        None => name,
    };
    let valid_name = !base_name.is_empty()
        && base_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    let valid_version = !version.is_empty()
        && !version.contains(['*', ',', '<', '>', '=', '!', '~', ' ']);

    if !valid_name || !valid_version {
        return None;
    }

    Some(Requirement {
        name: name.to_string(),
        version: version.to_string(),
        marker: marker.map(|m| m.trim().to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pipenv_export() {
        let text = "\
-i https://pypi.org/simple
anyio==3.6.2 ; python_full_version >= '3.6.2'
click==8.1.3; python_version >= '3.7'
fastapi==0.88.0
uvicorn[standard]==0.20.0
# comment line

";
        let reqs = PinnedRequirements::parse(text).unwrap();
        assert_eq!(reqs.len(), 4);
        assert_eq!(reqs.entries[0].name, "anyio");
        assert_eq!(reqs.entries[0].version, "3.6.2");
        assert_eq!(
            reqs.entries[0].marker.as_deref(),
            Some("python_full_version >= '3.6.2'")
        );
        assert_eq!(reqs.entries[3].name, "uvicorn[standard]");
        assert_eq!(reqs.as_text(), text);
    }

    #[test]
    fn test_hash_continuations() {
        let text = "\
fastapi==0.88.0 \\
    --hash=sha256:aaaa \\
    --hash=sha256:bbbb
pydantic==1.10.2
";
        let reqs = PinnedRequirements::parse(text).unwrap();
        assert_eq!(reqs.len(), 2);
        assert_eq!(reqs.entries[0].version, "0.88.0");
        assert_eq!(reqs.entries[1].name, "pydantic");
    }

    #[test]
    fn test_rejects_ranges() {
        let err = PinnedRequirements::parse("fastapi==0.88.0\nuvicorn>=0.20\n").unwrap_err();
        match err {
            ShipError::UnpinnedRequirement { line_no, line } => {
                assert_eq!(line_no, 2);
                assert_eq!(line, "uvicorn>=0.20");
            }
            other => panic!("unexpected error: {other}"),
        }

        assert!(PinnedRequirements::parse("requests\n").is_err());
        assert!(PinnedRequirements::parse("black==22.*\n").is_err());
        assert!(PinnedRequirements::parse("black~=22.1\n").is_err());
        assert!(PinnedRequirements::parse("pkg==1.0,<2\n").is_err());
        assert!(PinnedRequirements::parse("-e .\n").is_err());
    }

    #[test]
    fn test_arbitrary_equality_and_prerelease() {
        let reqs = PinnedRequirements::parse("black==22.10b0\nlegacy===1.0-custom\n").unwrap();
        assert_eq!(reqs.entries[0].version, "22.10b0");
        assert_eq!(reqs.entries[1].name, "legacy");
        assert_eq!(reqs.entries[1].version, "1.0-custom");
    }

    #[test]
    fn test_empty_export() {
        let reqs = PinnedRequirements::parse("-i https://pypi.org/simple\n").unwrap();
        assert!(reqs.is_empty());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn arb_name() -> impl Strategy<Value = String> {
            "[a-zA-Z][a-zA-Z0-9_.-]{0,20}"
        }

        fn arb_version() -> impl Strategy<Value = String> {
            "[0-9]{1,3}(\\.[0-9]{1,3}){0,3}(b[0-9])?"
        }

        proptest! {
            #[test]
            fn exact_pins_always_accepted(pins in prop::collection::vec((arb_name(), arb_version()), 0..20)) {
                let text: String = pins.iter().map(|(n, v)| format!("{}=={}\n", n, v)).collect();
                let reqs = PinnedRequirements::parse(&text).unwrap();
                prop_assert_eq!(reqs.len(), pins.len());
                prop_assert_eq!(reqs.as_text(), text.as_str());
            }

            #[test]
            fn ranges_always_rejected(
                name in arb_name(),
                version in arb_version(),
                op in prop_oneof![Just(">="), Just("<="), Just("~="), Just("!="), Just(">"), Just("<")],
            ) {
                let line = format!("{}{}{}", name, op, version);
                let text = format!("fastapi==0.88.0\n{}\n", line);
                match PinnedRequirements::parse(&text) {
                    Err(ShipError::UnpinnedRequirement { line_no, .. }) => prop_assert_eq!(line_no, 2),
                    other => prop_assert!(false, "unexpected result: {:?}", other.map(|r| r.len())),
                }
            }
        }
    }
}
