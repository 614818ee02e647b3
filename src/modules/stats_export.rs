//! Corpus-wide frequency list.

use rayon::prelude::*;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::base::Result;
use crate::registry::{Descriptor, FunctionDecl, Registry, TaskContext};

pub fn register(registry: &mut Registry) -> Result<()> {
    registry.register(
        FunctionDecl::exporter("stats_export:freq_list", "Word frequency list over all files")
            .param(
                "word",
                Descriptor::AnnotationAllFiles {
                    template: "<token:word>".to_owned(),
                },
            )
            .param(
                "out",
                Descriptor::Export {
                    template: "stats_export/freq_list.csv".to_owned(),
                },
            )
            .body(freq_list),
    )
}

fn freq_list(ctx: &mut TaskContext) -> Result<()> {
    let word = ctx.annotation("word")?.clone();
    let ctx = &*ctx;
    // Per-file counting is embarrassingly parallel; merge the local maps.
    let counts: FxHashMap<String, u64> = ctx
        .all_files()
        .par_iter()
        .map(|file| -> Result<FxHashMap<String, u64>> {
            let mut local = FxHashMap::default();
            for value in ctx.read_attribute_of(file, &word)?.into_iter().flatten() {
                *local.entry(value).or_insert(0) += 1;
            }
            Ok(local)
        })
        .try_reduce(FxHashMap::default, |mut merged, local| {
            for (value, count) in local {
                *merged.entry(value).or_insert(0) += count;
            }
            Ok(merged)
        })?;

    let mut rows: Vec<(String, u64)> = counts.into_iter().collect();
    rows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let mut out = String::from("word\tcount\n");
    for (word, count) in &rows {
        out.push_str(&format!("{word}\t{count}\n"));
    }
    ctx.write_export("out", out.as_bytes())?;
    debug!(entries = rows.len(), "wrote frequency list");
    Ok(())
}
