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

//! Data types to interact with email messages.

use regex::Regex;
use std::sync::LazyLock;
use travel_core::model::ModelResult;
use travel_core::template;

/// Matches any HTML tag, including comments and doctype declarations.
static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("Hardcoded regex must be valid"));

/// Escapes the characters of `text` that have special meaning in HTML.
pub fn escape_html(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => output.push_str("&amp;"),
            '<' => output.push_str("&lt;"),
            '>' => output.push_str("&gt;"),
            '"' => output.push_str("&quot;"),
            '\'' => output.push_str("&#x27;"),
            ch => output.push(ch),
        }
    }
    output
}

/// Derives a plain text rendition of `html` by removing all markup.
///
/// Only the entities produced by `escape_html` and `&nbsp;` are decoded.  `&amp;` goes last so
/// that escaped entities in the original text survive as literals.
pub fn strip_tags(html: &str) -> String {
    TAG_RE
        .replace_all(html, "")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

/// An email message ready to be handed to a `Mailer`.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderedMessage {
    /// Subject line of the message.
    pub subject: String,

    /// Plain text body of the message.
    pub plain_body: String,

    /// HTML body of the message.
    pub html_body: String,
}

/// A template for an email message written in HTML.
pub struct HtmlTemplate {
    /// Subject of the message.
    pub subject_template: &'static str,

    /// HTML body of the message.
    pub html_template: &'static str,
}

impl HtmlTemplate {
    /// Renders the template by applying the collection of `replacements` to it.
    ///
    /// Replacement values are inserted verbatim into the subject and HTML-escaped into the body.
    /// The plain text body is derived from the rendered HTML via `strip_tags`.
    pub fn render(&self, replacements: &[(&str, &str)]) -> ModelResult<RenderedMessage> {
        let subject = template::apply(self.subject_template, replacements)?;

        let escaped = replacements
            .iter()
            .map(|(key, value)| (*key, escape_html(value)))
            .collect::<Vec<(&str, String)>>();
        let escaped = escaped.iter().map(|(k, v)| (*k, v.as_str())).collect::<Vec<_>>();
        let html_body = template::apply(self.html_template, &escaped)?;

        let plain_body = strip_tags(&html_body);
        Ok(RenderedMessage { subject, plain_body, html_body })
    }
}
