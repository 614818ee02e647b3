//! Miscellaneous small annotators.

use crate::base::Result;
use crate::registry::{Descriptor, FunctionDecl, PreloadSpec, Registry, TaskContext};

pub fn register(registry: &mut Registry) -> Result<()> {
    registry.register(
        FunctionDecl::annotator("misc:word", "Token text as an attribute")
            .param("text", Descriptor::Text)
            .param(
                "token",
                Descriptor::Annotation {
                    template: "<token>".to_owned(),
                },
            )
            .param(
                "out",
                Descriptor::Output {
                    template: "<token>:misc.word".to_owned(),
                    class: Some("token:word".to_owned()),
                    description: Some("Token text".to_owned()),
                    allow_newlines: false,
                },
            )
            .preloadable(PreloadSpec {
                fingerprint_params: vec!["token".into()],
            })
            .body(word),
    )?;

    registry.register(
        FunctionDecl::annotator("misc:affix", "Add an affix to any attribute")
            .param(
                "wildcard_annotation",
                Descriptor::Wildcard {
                    name: "annotation".to_owned(),
                },
            )
            .param(
                "wildcard_attr",
                Descriptor::Wildcard {
                    name: "attr".to_owned(),
                },
            )
            .param(
                "input",
                Descriptor::Annotation {
                    template: "{annotation}:{attr}".to_owned(),
                },
            )
            .param(
                "out",
                Descriptor::Output {
                    template: "{annotation}:{attr}.affixed".to_owned(),
                    class: None,
                    description: None,
                    allow_newlines: false,
                },
            )
            .param(
                "affix",
                Descriptor::Config {
                    key: "misc.affix".to_owned(),
                },
            )
            .option(
                crate::config::ConfigOption::new("misc.affix", "Affix wrapped around values")
                    .with_default(serde_yaml::Value::String("|".to_owned())),
            )
            .body(affix),
    )
}

fn word(ctx: &mut TaskContext) -> Result<()> {
    let text = ctx.text()?;
    let tokens = ctx.read_spans("token")?;
    let chars: Vec<char> = text.chars().collect();

    let values: Vec<Option<String>> = tokens
        .iter()
        .map(|span| {
            let start = span.start() as usize;
            let end = (span.end() as usize).min(chars.len());
            Some(chars[start..end].iter().collect())
        })
        .collect();
    ctx.write_attribute("out", &values)
}

/// Wildcard annotator: wraps the values of any attribute in an affix.
fn affix(ctx: &mut TaskContext) -> Result<()> {
    let affix = ctx
        .config_str("affix")?
        .unwrap_or("|")
        .to_owned();
    let values = ctx.read_attribute("input")?;
    let wrapped: Vec<Option<String>> = values
        .into_iter()
        .map(|v| v.map(|v| format!("{affix}{v}{affix}")))
        .collect();
    ctx.write_attribute("out", &wrapped)
}
