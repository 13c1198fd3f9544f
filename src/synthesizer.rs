// src/synthesizer.rs
//
// The final single-shot summarization pass. Invoked exactly once per
// session; streams report fragments to the sink as the engine produces
// them. On any failure the report degrades to a best-effort rendering of
// the gathered sources - it is never blank.

use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::activity::ActivityLog;
use crate::events::{EventSink, ResearchEvent};
use crate::providers::ReasoningEngine;
use crate::session::ResearchSession;
use crate::sources::SourceRegistry;

pub struct Synthesizer {
    engine: Arc<dyn ReasoningEngine>,
    // Bounds the stream-open call and each fragment await
    timeout: Duration,
}

impl Synthesizer {
    pub fn new(engine: Arc<dyn ReasoningEngine>, timeout: Duration) -> Self {
        Self { engine, timeout }
    }

    /// Produce the final report, emitting a text-delta per fragment.
    /// Returns the concatenated report text.
    ///
    /// `partial` marks a budget- or cancellation-shortened session so the
    /// prompt asks for an explicitly partial report.
    pub async fn synthesize(
        &self,
        session: &ResearchSession,
        activity: &ActivityLog,
        sources: &SourceRegistry,
        partial: bool,
        sink: &EventSink,
    ) -> String {
        if sources.is_empty() && session.summary.is_empty() {
            let report = empty_report(&session.query);
            sink.emit(ResearchEvent::TextDelta { fragment: report.clone() }).await;
            return report;
        }

        let prompt = self.build_prompt(session, activity, sources, partial);

        match timeout(self.timeout, self.engine.complete_stream(&prompt)).await {
            Ok(Ok(mut stream)) => {
                let mut report = String::new();
                loop {
                    match timeout(self.timeout, stream.next()).await {
                        Ok(Some(Ok(text))) => {
                            report.push_str(&text);
                            sink.emit(ResearchEvent::TextDelta { fragment: text }).await;
                        }
                        Ok(Some(Err(e))) => {
                            warn!("synthesis stream broke: {}", e);
                            break;
                        }
                        Ok(None) => break,
                        Err(_) => {
                            warn!("synthesis stream stalled past {:?}", self.timeout);
                            break;
                        }
                    }
                }
                if report.trim().is_empty() {
                    let fallback = fallback_report(session, sources);
                    sink.emit(ResearchEvent::TextDelta { fragment: fallback.clone() }).await;
                    return fallback;
                }
                info!(chars = report.len(), "synthesis complete");
                report
            }
            Ok(Err(e)) => {
                warn!("synthesis call failed: {}", e);
                let fallback = fallback_report(session, sources);
                sink.emit(ResearchEvent::TextDelta { fragment: fallback.clone() }).await;
                fallback
            }
            Err(_) => {
                warn!("synthesis call timed out after {:?}", self.timeout);
                let fallback = fallback_report(session, sources);
                sink.emit(ResearchEvent::TextDelta { fragment: fallback.clone() }).await;
                fallback
            }
        }
    }

    fn build_prompt(
        &self,
        session: &ResearchSession,
        activity: &ActivityLog,
        sources: &SourceRegistry,
        partial: bool,
    ) -> String {
        let coverage = if partial {
            "The research budget ran out before the topic was fully covered; say so up front and report what was gathered."
        } else {
            "The research loop ran to a natural finish."
        };
        format!(
            r#"You are an expert research analyst. Write the final report for this research session.

ORIGINAL QUESTION: "{query}"

RUNNING SUMMARY:
{summary}

RESEARCH LOG:
{log}

SOURCES ({source_count}):
{sources}

{coverage}

Write a well-structured markdown report answering the original question.
Cite sources inline as [N] matching the numbered source list.
Be specific: include dates, numbers and statistics where the sources provide them.
Note conflicting information if found."#,
            query = session.query,
            summary = if session.summary.is_empty() { "(none)" } else { &session.summary },
            log = activity.transcript(),
            source_count = sources.len(),
            sources = sources.digest(),
            coverage = coverage,
        )
    }
}

/// Report used when nothing at all was gathered.
pub fn empty_report(query: &str) -> String {
    format!(
        "No information could be gathered for \"{}\" within the research budget. \
         No sources were reachable and no findings were produced.",
        query
    )
}

/// Best-effort report assembled from source titles and snippets, used when
/// the reasoning engine cannot produce the synthesis.
pub fn fallback_report(session: &ResearchSession, sources: &SourceRegistry) -> String {
    let mut report = format!(
        "# Research notes: {}\n\nReport synthesis was unavailable; raw findings from {} source(s) follow.\n",
        session.query,
        sources.len()
    );
    if !session.summary.is_empty() {
        report.push_str(&format!("\n## Interim summary\n\n{}\n", session.summary));
    }
    report.push_str("\n## Sources\n\n");
    for (i, source) in sources.all_sources().iter().enumerate() {
        report.push_str(&format!(
            "{}. [{}]({}) - {}\n",
            i + 1,
            source.title,
            source.url,
            source.snippet.as_deref().unwrap_or("no description")
        ));
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ResearchRequest;
    use crate::sources::SourceCandidate;

    #[test]
    fn test_empty_report_mentions_query() {
        let report = empty_report("quic vs tcp");
        assert!(report.contains("quic vs tcp"));
        assert!(!report.is_empty());
    }

    #[test]
    fn test_fallback_report_lists_sources() {
        let session = ResearchSession::new(&ResearchRequest::new("quic vs tcp")).unwrap();
        let mut sources = SourceRegistry::new();
        sources.register(SourceCandidate {
            url: "https://example.com/quic".into(),
            title: "QUIC overview".into(),
            snippet: Some("a transport protocol".into()),
        });

        let report = fallback_report(&session, &sources);
        assert!(report.contains("QUIC overview"));
        assert!(report.contains("https://example.com/quic"));
        assert!(report.contains("a transport protocol"));
    }
}
