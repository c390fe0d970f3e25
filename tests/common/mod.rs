//! Shared stage doubles for the integration suites
#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use civic_qa::pipeline::{
    AnalysisInput, ContentProcessor, DocumentRetriever, GenerationInput, ProcessingInput,
    QueryAnalyzer, ResponseGenerator, RetrievalInput, StageSet,
};
use civic_qa::state::{
    DifficultyLevel, DocumentResult, GeneratedResponse, ProcessedContent, QueryAnalysis,
    RelatedLink, RetrievalResult,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How a mock stage behaves across calls
#[derive(Debug, Default)]
pub struct Behavior {
    /// Fail this many calls before succeeding
    pub fail_first: usize,
    pub always_fail: bool,
    /// Sleep before answering (tokio clock, so paused tests stay fast)
    pub delay: Option<Duration>,
    calls: AtomicUsize,
}

impl Behavior {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            always_fail: true,
            ..Self::default()
        }
    }

    pub fn fail_first(n: usize) -> Self {
        Self {
            fail_first: n,
            ..Self::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn enter(&self, backend: &str) -> Result<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.always_fail || call <= self.fail_first {
            bail!("{} backend unavailable (call {})", backend, call);
        }
        Ok(())
    }
}

/// Korean text exactly `chars` characters long
pub fn korean_text(chars: usize) -> String {
    "정부24에서 신청하세요 ".chars().cycle().take(chars).collect()
}

pub fn document(i: usize) -> DocumentResult {
    DocumentResult {
        id: format!("doc-{}", i),
        title: format!("주민등록등본 발급 안내 {}", i),
        content: "주민등록등본은 주민센터 또는 정부24에서 발급할 수 있습니다.".to_string(),
        category: "행정".to_string(),
        published_date: "2024-03-01".to_string(),
        difficulty: DifficultyLevel::Beginner,
        score: 0.9 - i as f64 * 0.1,
        highlights: vec!["정부24".to_string()],
        metadata: HashMap::new(),
    }
}

pub struct MockAnalyzer {
    pub confidence: f64,
    pub behavior: Behavior,
}

#[async_trait]
impl QueryAnalyzer for MockAnalyzer {
    async fn analyze(&self, input: AnalysisInput) -> Result<QueryAnalysis> {
        // Backend names avoid stage words; the executor's label prefix picks the resume point.
        self.behavior.enter("nlu").await?;
        Ok(QueryAnalysis {
            processed_query: input.query.trim().to_string(),
            intent: "procedure_inquiry".to_string(),
            category: Some("행정".to_string()),
            keywords: input.query.split_whitespace().map(str::to_string).collect(),
            entities: BTreeMap::new(),
            confidence: self.confidence,
            suggestions: vec![],
        })
    }
}

pub struct MockRetriever {
    pub total_count: usize,
    pub behavior: Behavior,
}

#[async_trait]
impl DocumentRetriever for MockRetriever {
    async fn retrieve(&self, input: RetrievalInput) -> Result<RetrievalResult> {
        self.behavior.enter("search").await?;
        let returned = self.total_count.min(input.max_results);
        Ok(RetrievalResult {
            documents: (0..returned).map(document).collect(),
            total_count: self.total_count,
            search_strategy: "hybrid".to_string(),
        })
    }
}

pub struct MockProcessor {
    pub content: String,
    pub readability: f64,
    pub behavior: Behavior,
}

#[async_trait]
impl ContentProcessor for MockProcessor {
    async fn process(&self, input: ProcessingInput) -> Result<ProcessedContent> {
        self.behavior.enter("simplifier").await?;
        Ok(ProcessedContent {
            simplified_content: self.content.clone(),
            key_points: vec!["신분증을 준비하세요".to_string()],
            step_by_step_guide: vec!["정부24 접속".to_string(), "발급 신청".to_string()],
            terminology_explanations: BTreeMap::new(),
            target_difficulty: input.target_difficulty,
            readability_score: self.readability,
        })
    }
}

pub struct MockGenerator {
    pub response: String,
    pub confidence: f64,
    pub behavior: Behavior,
}

#[async_trait]
impl ResponseGenerator for MockGenerator {
    async fn generate(&self, _input: GenerationInput) -> Result<GeneratedResponse> {
        self.behavior.enter("llm").await?;
        Ok(GeneratedResponse {
            main_response: self.response.clone(),
            follow_up_questions: vec!["수수료는 얼마인가요?".to_string()],
            related_links: vec![RelatedLink {
                title: "정부24".to_string(),
                url: "https://www.gov.kr".to_string(),
            }],
            confidence_score: self.confidence,
        })
    }
}

/// One mock per stage, kept behind `Arc` so tests can read call counts
pub struct Mocks {
    pub analyzer: Arc<MockAnalyzer>,
    pub retriever: Arc<MockRetriever>,
    pub processor: Arc<MockProcessor>,
    pub generator: Arc<MockGenerator>,
}

impl Mocks {
    /// Healthy chain: 0.9 confidence, 3 documents, 120-char content at 0.8
    /// readability, 80-char response at 0.85 confidence
    pub fn healthy() -> MocksBuilder {
        MocksBuilder {
            analyzer: MockAnalyzer {
                confidence: 0.9,
                behavior: Behavior::ok(),
            },
            retriever: MockRetriever {
                total_count: 3,
                behavior: Behavior::ok(),
            },
            processor: MockProcessor {
                content: korean_text(120),
                readability: 0.8,
                behavior: Behavior::ok(),
            },
            generator: MockGenerator {
                response: korean_text(80),
                confidence: 0.85,
                behavior: Behavior::ok(),
            },
        }
    }

    pub fn stage_set(&self) -> StageSet {
        StageSet {
            analyzer: self.analyzer.clone(),
            retriever: self.retriever.clone(),
            processor: self.processor.clone(),
            generator: self.generator.clone(),
        }
    }
}

pub struct MocksBuilder {
    pub analyzer: MockAnalyzer,
    pub retriever: MockRetriever,
    pub processor: MockProcessor,
    pub generator: MockGenerator,
}

impl MocksBuilder {
    pub fn analyzer(mut self, f: impl FnOnce(&mut MockAnalyzer)) -> Self {
        f(&mut self.analyzer);
        self
    }

    pub fn retriever(mut self, f: impl FnOnce(&mut MockRetriever)) -> Self {
        f(&mut self.retriever);
        self
    }

    pub fn processor(mut self, f: impl FnOnce(&mut MockProcessor)) -> Self {
        f(&mut self.processor);
        self
    }

    pub fn generator(mut self, f: impl FnOnce(&mut MockGenerator)) -> Self {
        f(&mut self.generator);
        self
    }

    pub fn build(self) -> Mocks {
        Mocks {
            analyzer: Arc::new(self.analyzer),
            retriever: Arc::new(self.retriever),
            processor: Arc::new(self.processor),
            generator: Arc::new(self.generator),
        }
    }
}
