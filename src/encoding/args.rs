//! Argument template handling
//!
//! Profiles store encoder arguments as a single command-line string. It is
//! split into an argument vector here so the encoder is spawned directly,
//! without a shell. Double or single quotes group words; `$INPUT` and
//! `$OUTPUT` tokens become literal paths, which is what quoting them on a
//! command line would achieve.

use std::path::Path;

pub const INPUT_PLACEHOLDER: &str = "$INPUT";
pub const OUTPUT_PLACEHOLDER: &str = "$OUTPUT";

/// Splits a command-line template into words.
pub fn split(template: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;

    for c in template.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                in_word = true;
            }
            None if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            None => {
                current.push(c);
                in_word = true;
            }
        }
    }

    if in_word {
        words.push(current);
    }

    words
}

/// Whether the template positions the input or output path itself
pub fn has_placeholders(template: &str) -> bool {
    template.contains(INPUT_PLACEHOLDER) || template.contains(OUTPUT_PLACEHOLDER)
}

/// Builds the encoder argument vector for one input/output pair.
///
/// Templates that reference `$INPUT`/`$OUTPUT` are used as-is with the
/// placeholders substituted. Otherwise the default invocation is
/// `-hide_banner -loglevel info -stats -i <input> <template> <output>`.
pub fn encoder_args(template: &str, input: &Path, output: &Path) -> Vec<String> {
    let input = input.to_string_lossy();
    let output = output.to_string_lossy();

    if has_placeholders(template) {
        return split(template)
            .into_iter()
            .map(|word| {
                word.replace(INPUT_PLACEHOLDER, &input)
                    .replace(OUTPUT_PLACEHOLDER, &output)
            })
            .collect();
    }

    let mut args: Vec<String> = ["-hide_banner", "-loglevel", "info", "-stats", "-i"]
        .into_iter()
        .map(String::from)
        .collect();
    args.push(input.into_owned());
    args.extend(split(template));
    args.push(output.into_owned());
    args
}
