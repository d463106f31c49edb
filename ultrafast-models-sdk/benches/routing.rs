use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;
use ultrafast_models_sdk::catalogue::{
    ApiKeyDescriptor, CatalogueStore, InMemoryCatalogue, ModelDescriptor, ModelProviderLink,
    ModelType, ProviderDescriptor, ProviderKind,
};
use ultrafast_models_sdk::metrics::MetricsRegistry;
use ultrafast_models_sdk::router::{Router, RouterConfig};
use ultrafast_models_sdk::{ChatRequest, Message};

fn sample_catalogue() -> InMemoryCatalogue {
    let catalogue = InMemoryCatalogue::new();
    catalogue.add_model(ModelDescriptor {
        id: 1,
        name: "gpt-4".to_string(),
        model_type: ModelType::Public,
        enabled: true,
        capabilities: vec!["TEXT".to_string()],
    });
    for (provider_id, name, cost) in [(10, "openai", 0.01), (20, "custom", 0.02), (30, "zhipu", 0.015)] {
        catalogue.add_provider(ProviderDescriptor {
            id: provider_id,
            name: name.to_string(),
            kind: ProviderKind::ThirdParty,
            official_endpoint: Some(format!("https://{name}.example.com/v1")),
            third_party_endpoint: None,
            enabled: true,
        });
        catalogue.add_link(ModelProviderLink {
            llm_id: 1,
            provider_id,
            weight: 1.0,
            preferred: false,
            enabled: true,
            cost_per_1k_tokens: cost,
        });
        catalogue.add_api_key(ApiKeyDescriptor {
            id: provider_id * 10,
            provider_id,
            api_key: format!("sk-{name}"),
            base_url: None,
            enabled: true,
            preferred: false,
            weight: 1.0,
            daily_quota: None,
            usage_count: 0,
            description: None,
        });
    }
    catalogue
}

/// Throughput of a single `select` call across three equal-weight
/// providers. The actual chi-squared convergence check for invariant 5
/// lives in `router.rs`'s unit tests; this is purely a speed measurement.
fn bench_router_select(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let catalogue = Arc::new(sample_catalogue());
    let router = Router::new(catalogue as Arc<dyn CatalogueStore>, MetricsRegistry::new(), RouterConfig::default());

    c.bench_function("router_select_three_equal_providers", |b| {
        b.to_async(&runtime).iter(|| async {
            let decision = router.select(black_box("gpt-4")).await.unwrap();
            black_box(decision);
        });
    });
}

fn bench_chat_request_serialization(c: &mut Criterion) {
    let request = ChatRequest {
        model: "gpt-4".to_string(),
        messages: vec![
            Message::system("You are a helpful assistant."),
            Message::user("Hello, how are you?"),
        ],
        temperature: Some(0.7),
        max_tokens: Some(100),
        stream: Some(false),
        ..Default::default()
    };

    c.bench_function("chat_request_serialization", |b| {
        b.iter(|| {
            let _json = serde_json::to_string(black_box(&request));
        });
    });
}

criterion_group!(benches, bench_router_select, bench_chat_request_serialization);
criterion_main!(benches);
