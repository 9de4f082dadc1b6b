use anyhow::Result;
use console::style;
use noteseek_engine::{DocumentMeta, EngineStatus};
use noteseek_search::SearchHit;

pub fn print_hits(hits: &[SearchHit], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(hits)?);
        return Ok(());
    }

    if hits.is_empty() {
        println!("No matches");
        return Ok(());
    }

    for hit in hits {
        let location = match &hit.heading_path {
            Some(heading) => format!("{} › {heading}", hit.path),
            None => hit.path.clone(),
        };
        println!(
            "{:>5.2}  {}",
            hit.score,
            style(&hit.title).bold()
        );
        println!("       {}", style(location).dim());
        if !hit.snippet.is_empty() {
            println!("       {}", hit.snippet.replace('\n', " "));
        }
    }
    Ok(())
}

pub fn print_documents(docs: &[DocumentMeta], json: bool) -> Result<()> {
    if json {
        let rows: Vec<serde_json::Value> = docs
            .iter()
            .map(|doc| {
                serde_json::json!({
                    "path": doc.path,
                    "mtime": doc.mtime,
                    "tags": doc.tags,
                    "folder": doc.folder,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    for doc in docs {
        if doc.tags.is_empty() {
            println!("{}", doc.path);
        } else {
            println!("{}  {}", doc.path, style(format!("#{}", doc.tags.join(" #"))).dim());
        }
    }
    Ok(())
}

pub fn print_status(status: &EngineStatus) {
    println!("documents        {}", status.documents);
    println!("chunks           {}", status.chunks);
    println!("embedded chunks  {}", status.embedded_chunks);
    println!("pending          {}", status.pending);
    println!("stale            {}", status.stale);
    if let Some(wait) = status.idle_in_secs {
        println!("processing in    {wait}s");
    }
    if let Some(err) = &status.last_error {
        println!("last error       {}", style(err).red());
    }
}
