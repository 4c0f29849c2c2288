use criterion::{black_box, criterion_group, criterion_main, Criterion};

use copilot_gateway::protocol::anthropic::AnthropicAdapter;
use copilot_gateway::protocol::ollama::OllamaAdapter;
use copilot_gateway::protocol::ChatAdapter;

fn text_stream_fixture(frames: usize) -> String {
    let mut sse = String::new();
    for i in 0..frames {
        sse.push_str(&format!(
            "data: {{\"model\":\"gpt-4o\",\"created\":1700000000,\"choices\":[{{\"index\":0,\"delta\":{{\"content\":\"token {i} \"}}}}]}}\n\n"
        ));
    }
    sse.push_str("data: {\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}],\"usage\":{\"prompt_tokens\":64,\"completion_tokens\":128}}\n\n");
    sse.push_str("data: [DONE]\n\n");
    sse
}

fn bench_anthropic_stream(c: &mut Criterion) {
    let fixture = text_stream_fixture(128);
    c.bench_function("anthropic_stream_128_deltas", |b| {
        b.iter(|| {
            let adapter = AnthropicAdapter;
            let mut buffer = black_box(fixture.clone());
            let mut state = Default::default();
            let mut out = Vec::with_capacity(160);
            adapter
                .parse_stream_chunk(&mut buffer, &mut state, &mut out)
                .unwrap();
            adapter.finish_stream(&mut state, &mut out);
            black_box(out)
        });
    });
}

fn bench_ollama_stream_chunked(c: &mut Criterion) {
    let fixture = text_stream_fixture(128);
    // Feed in 64-byte slices to exercise the partial-frame path.
    c.bench_function("ollama_stream_64b_chunks", |b| {
        b.iter(|| {
            let adapter = OllamaAdapter;
            let mut buffer = String::new();
            let mut state = Default::default();
            let mut out = Vec::with_capacity(160);
            for chunk in fixture.as_bytes().chunks(64) {
                buffer.push_str(std::str::from_utf8(chunk).unwrap());
                adapter
                    .parse_stream_chunk(&mut buffer, &mut state, &mut out)
                    .unwrap();
            }
            adapter.finish_stream(&mut state, &mut out);
            black_box(out)
        });
    });
}

criterion_group!(benches, bench_anthropic_stream, bench_ollama_stream_chunked);
criterion_main!(benches);
