//! Search augmentation and stream encoding benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use llmgate::search::{build_augmented_prompt, dedup_results, format_search_context, parse_keywords, SearchResult};
use llmgate::services::StreamEvent;

/// Create results with every third URL repeated
fn create_results(count: usize) -> Vec<SearchResult> {
    (0..count)
        .map(|i| SearchResult {
            title: format!("Result title {}", i),
            url: format!("https://example.com/page/{}", i - i % 3),
            snippet: "A short excerpt of the page that matched the search keyword. ".repeat(3),
            source_keyword: format!("keyword {}", i % 4),
            published_time: Some("2024-05-01T00:00:00Z".to_string()),
            relevance_score: Some(0.8),
        })
        .collect()
}

fn bench_search_context(c: &mut Criterion) {
    let mut group = c.benchmark_group("search_context");

    for count in [5usize, 20, 100] {
        let results = create_results(count);

        group.bench_with_input(BenchmarkId::new("dedup", count), &results, |b, results| {
            b.iter(|| dedup_results(black_box(results.clone()), black_box(10)))
        });

        group.bench_with_input(BenchmarkId::new("format_and_prompt", count), &results, |b, results| {
            b.iter(|| {
                let context = format_search_context(black_box(results));
                build_augmented_prompt(black_box("What changed in the latest Rust release?"), &context)
            })
        });
    }

    group.finish();
}

fn bench_parse_keywords(c: &mut Criterion) {
    let replies = [
        ("ascii", "rust release, rust 1.80 features, cargo changes, edition 2024, extra"),
        ("full_width", "上海天气，明天 降雨，空气质量，出行建议"),
    ];

    let mut group = c.benchmark_group("parse_keywords");
    for (name, reply) in replies {
        group.bench_function(name, |b| b.iter(|| parse_keywords(black_box(reply))));
    }
    group.finish();
}

fn bench_stream_encoding(c: &mut Criterion) {
    let fragment = StreamEvent::Content("The quick brown fox jumps over the \"lazy\" dog.\n".to_string());
    let error = StreamEvent::Error("Request to Mock failed: connection reset".to_string());

    c.bench_function("stream_encode_content", |b| b.iter(|| black_box(&fragment).encode()));
    c.bench_function("stream_encode_error", |b| b.iter(|| black_box(&error).encode()));
    c.bench_function("stream_encode_done", |b| b.iter(|| black_box(&StreamEvent::Done).encode()));
}

criterion_group!(benches, bench_search_context, bench_parse_keywords, bench_stream_encoding);
criterion_main!(benches);
