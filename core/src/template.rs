// Travel listings
// Copyright 2023 Julio Merino
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not
// use this file except in compliance with the License.  You may obtain a copy
// of the License at:
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS, WITHOUT
// WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.  See the
// License for the specific language governing permissions and limitations
// under the License.

//! Trivial templating engine for notification messages.

use crate::model::{ModelError, ModelResult};

/// Performs named string replacements in `input` based on `replacements`.
///
/// The `input` string can have `%key%` placeholders where `key` must appear in `replacements`.
/// Raw `%` characters are written as `%%`.  Replacement values are inserted verbatim and are not
/// expanded again.
///
/// Returns an error if a placeholder has no replacement, if a key is defined more than once, or if
/// a placeholder is not terminated.
pub fn apply(input: &str, replacements: &[(&str, &str)]) -> ModelResult<String> {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find('%') {
        output.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('%') else {
            return Err(ModelError(format!("Unterminated placeholder in template: {}", rest)));
        };

        let key = &after[..end];
        if key.is_empty() {
            output.push('%');
        } else {
            let mut values = replacements.iter().filter(|(k, _)| *k == key).map(|(_, v)| v);
            match (values.next(), values.next()) {
                (Some(value), None) => output.push_str(value),
                (Some(_), Some(_)) => {
                    return Err(ModelError(format!("Duplicate replacement for key {}", key)));
                }
                (None, _) => return Err(ModelError(format!("No replacement for key {}", key))),
            }
        }
        rest = &after[end + 1..];
    }
    output.push_str(rest);
    Ok(output)
}
