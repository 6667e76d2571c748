//! Markdown rendering of a finished analysis.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::analysis::{
    AssistantLabels, FullAnalysis, GroupStats, PairedTest, SummaryStatistics, WebSearchImpact,
};
use crate::types::Metric;

/// Render the whole analysis as a markdown document.
pub fn render_markdown(
    analysis: &FullAnalysis,
    insights: &[String],
    labels: &AssistantLabels,
) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "# Assistant comparison report\n");
    let _ = writeln!(
        out,
        "Generated {} over {} scored queries.\n",
        analysis.metadata.generated_at.format("%Y-%m-%d %H:%M UTC"),
        analysis.metadata.total_queries
    );

    if !insights.is_empty() {
        let _ = writeln!(out, "## Key findings\n");
        for (i, insight) in insights.iter().enumerate() {
            let _ = writeln!(out, "{}. {insight}", i + 1);
        }
        let _ = writeln!(out);
    }

    render_summary(&mut out, &analysis.summary, labels);
    render_tests(&mut out, &analysis.tests, labels);
    render_breakdown(&mut out, "By category", &analysis.by_category, labels);
    render_breakdown(&mut out, "By query quality", &analysis.by_quality, labels);
    render_breakdown(
        &mut out,
        "By intent clarity",
        &analysis.by_intent_clarity,
        labels,
    );
    render_web_search(&mut out, &analysis.web_search, labels);

    out
}

fn render_summary(out: &mut String, summary: &SummaryStatistics, labels: &AssistantLabels) {
    let _ = writeln!(out, "## Summary statistics\n");
    let _ = writeln!(out, "| Assistant | Metric | Mean | Median | Std | Min | Max |");
    let _ = writeln!(out, "|---|---|---|---|---|---|---|");
    for (label, stats) in [(&labels.a, &summary.assistant_a), (&labels.b, &summary.assistant_b)] {
        for metric in Metric::ALL {
            if let Some(s) = stats.metrics.get(metric.as_str()) {
                let _ = writeln!(
                    out,
                    "| {label} | {} | {:.2} | {:.2} | {:.2} | {:.0} | {:.0} |",
                    metric.as_str(),
                    s.mean,
                    s.median,
                    s.std,
                    s.min,
                    s.max
                );
            }
        }
    }
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Intent understood: {} {:.1}%, {} {:.1}%. Follow-ups needed on average: {} {:.2}, {} {:.2}.\n",
        labels.a,
        summary.assistant_a.intent_understanding_rate,
        labels.b,
        summary.assistant_b.intent_understanding_rate,
        labels.a,
        summary.assistant_a.avg_followups,
        labels.b,
        summary.assistant_b.avg_followups,
    );
}

fn render_tests(out: &mut String, tests: &BTreeMap<String, PairedTest>, labels: &AssistantLabels) {
    let _ = writeln!(out, "## Paired significance tests\n");
    let _ = writeln!(
        out,
        "Difference is {} minus {}; positive favors {}.\n",
        labels.b, labels.a, labels.b
    );
    let _ = writeln!(out, "| Metric | n | {} mean | {} mean | Diff | t | p | Effect |", labels.a, labels.b);
    let _ = writeln!(out, "|---|---|---|---|---|---|---|---|");
    for (metric, test) in tests {
        match test {
            PairedTest::Insufficient { n } => {
                let _ = writeln!(out, "| {metric} | {n} | — | — | — | — | — | insufficient data |");
            }
            PairedTest::Computed(r) => {
                let marker = if r.significant { " *" } else { "" };
                let _ = writeln!(
                    out,
                    "| {metric} | {} | {:.2} | {:.2} | {:+.2} | {:.3} | {:.4}{marker} | {} |",
                    r.n, r.mean_a, r.mean_b, r.difference, r.t_statistic, r.p_value,
                    r.effect_size.as_str()
                );
            }
        }
    }
    let _ = writeln!(out, "\n\\* significant at p < 0.05\n");
}

fn render_breakdown(
    out: &mut String,
    title: &str,
    groups: &BTreeMap<String, GroupStats>,
    labels: &AssistantLabels,
) {
    if groups.is_empty() {
        return;
    }
    let _ = writeln!(out, "## {title}\n");
    let _ = writeln!(out, "| Group | n | Assistant | Relevance | Completeness | Clarity | Intent % |");
    let _ = writeln!(out, "|---|---|---|---|---|---|---|");
    for (name, group) in groups {
        for (label, stats) in [(&labels.a, &group.assistant_a), (&labels.b, &group.assistant_b)] {
            let cell = |metric: Metric| {
                stats
                    .metrics
                    .get(metric.as_str())
                    .map(|v| format!("{v:.2}"))
                    .unwrap_or_else(|| "—".to_string())
            };
            let intent = stats
                .intent_rate
                .map(|v| format!("{v:.1}"))
                .unwrap_or_else(|| "—".to_string());
            let _ = writeln!(
                out,
                "| {name} | {} | {label} | {} | {} | {} | {intent} |",
                group.count,
                cell(Metric::Relevance),
                cell(Metric::Completeness),
                cell(Metric::Clarity),
            );
        }
    }
    let _ = writeln!(out);
}

fn render_web_search(out: &mut String, impact: &WebSearchImpact, labels: &AssistantLabels) {
    let _ = writeln!(out, "## Web search impact ({})\n", labels.a);
    let _ = writeln!(
        out,
        "{} of {} scored queries used web search.\n",
        impact.with_search.count,
        impact.with_search.count + impact.without_search.count
    );

    if impact.comparison.is_empty() {
        let _ = writeln!(out, "Not enough data in both groups to compare.\n");
        return;
    }

    let _ = writeln!(out, "| Metric | With search | Without | Diff | Change |");
    let _ = writeln!(out, "|---|---|---|---|---|");
    for (metric, delta) in &impact.comparison {
        let with = impact.with_search.assistant_a.get(metric).copied().unwrap_or(0.0);
        let without = impact.without_search.assistant_a.get(metric).copied().unwrap_or(0.0);
        let _ = writeln!(
            out,
            "| {metric} | {with:.2} | {without:.2} | {:+.2} | {:+.1}% |",
            delta.difference, delta.percent_change
        );
    }
    let _ = writeln!(out);
}
