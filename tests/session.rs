//! End-to-end behaviour of a caption session and randomized bounds checks on the
//! fusion and threshold stages.

use std::f32::consts::PI;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use capgate::dsp::{AudioQualityEstimator, ProsodyExtractor};
use capgate::{
    AdaptiveThresholdController, AudioQuality, CaptionSession, ChunkInput, Component,
    ConfidenceBreakdown, DegradeReason, Provenance,
    ConfidenceFusionEngine, EmotionFeatures, EmotionType, EngineConfig, ForceReason,
    FusionConfig, FusionInputs, GateDecision, Lexicon, PerformanceSample, ProsodyFeatures,
    TextConfig, ThresholdConfig, ThresholdState, WordBoundary, MAX_THRESHOLD, MIN_THRESHOLD,
};

const SR: u32 = 16000;

fn unbounded_config() -> EngineConfig {
    EngineConfig {
        latency_budget_ms: 0,
        ..EngineConfig::default()
    }
}

/// `secs` of a 160 Hz voice-like tone over low-level noise.
fn speech_like(secs: f32, amplitude: f32, noise: f32, rng: &mut StdRng) -> Vec<f32> {
    let n = (secs * SR as f32) as usize;
    (0..n)
        .map(|i| {
            let t = i as f32 / SR as f32;
            let envelope = 0.6 + 0.4 * (2.0 * PI * 3.0 * t).sin();
            let voice = 0.6 * (2.0 * PI * 160.0 * t).sin()
                + 0.3 * (2.0 * PI * 320.0 * t).sin()
                + 0.1 * (2.0 * PI * 1800.0 * t).sin();
            amplitude * envelope * voice + noise * rng.gen_range(-1.0f32..1.0)
        })
        .collect()
}

fn boundaries(words: &[&str], spacing: f32) -> Vec<WordBoundary> {
    words
        .iter()
        .enumerate()
        .map(|(i, w)| WordBoundary {
            word: (*w).to_string(),
            start_secs: i as f32 * spacing,
            end_secs: i as f32 * spacing + spacing * 0.8,
        })
        .collect()
}

fn random_quality(rng: &mut StdRng) -> AudioQuality {
    AudioQuality {
        noise_level: rng.gen(),
        volume_level: rng.gen(),
        clarity_score: rng.gen(),
        sample_rate: SR,
    }
}

fn random_emotion(rng: &mut StdRng) -> EmotionFeatures {
    EmotionFeatures {
        emotion_type: EmotionType::ALL[rng.gen_range(0..EmotionType::ALL.len())],
        intensity: rng.gen(),
        tone_confidence: rng.gen(),
        ..EmotionFeatures::fallback()
    }
}

fn random_sample(rng: &mut StdRng) -> PerformanceSample {
    PerformanceSample::from_prf(rng.gen(), rng.gen(), rng.gen())
}

#[test]
fn live_stream_session() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut session = CaptionSession::new(unbounded_config()).unwrap();

    let script: [(&str, f32); 6] = [
        ("家人们晚上好,欢迎来到直播间", 0.92),
        ("今天这款产品真的超级划算", 0.88),
        ("因为库存有限,所以大家赶紧下单", 0.85),
        ("点击下方链接就可以购买", 0.9),
        ("嗯那个呃", 0.35),
        ("thank you for watching", 0.8),
    ];

    for (i, (text, confidence)) in script.iter().enumerate() {
        let words: Vec<&str> = text.split(',').collect();
        let chunk = ChunkInput::text_only(*text, *confidence, 1.5)
            .with_audio(speech_like(1.5, 0.3, 0.01, &mut rng), SR)
            .with_word_boundaries(boundaries(&words, 0.5));
        let out = session.process_chunk(&chunk, None);

        let b = &out.breakdown;
        for score in [
            b.recognizer_confidence,
            b.word_frequency_score,
            b.context_coherence_score,
            b.audio_quality_score,
            b.final_confidence,
        ] {
            assert!((0.0..=1.0).contains(&score), "chunk {i}: {b:?}");
        }
        assert!((MIN_THRESHOLD..=MAX_THRESHOLD).contains(&out.threshold));
        assert_eq!(out.threshold, session.threshold_state().current_threshold);
        assert!(!out.audio_quality.is_defaulted(), "chunk {i}");
        assert!(!out.deadline_exceeded);
    }

    let stats = *session.stats();
    assert_eq!(stats.chunks, script.len() as u64);
    assert_eq!(stats.accepted + stats.forced + stats.rejected, stats.chunks);
    assert!(stats.accepted >= 3, "{stats:?}");
    assert!((MIN_THRESHOLD..=MAX_THRESHOLD).contains(&stats.mean_threshold));
    assert!(session.fusion().token_history().len() > 10);

    // Snapshots are exportable
    let json = serde_json::to_string(&stats).unwrap();
    assert!(json.contains("\"chunks\":6"));
    let state = serde_json::to_string(session.threshold_state()).unwrap();
    assert!(state.contains("current_threshold"));
}

#[test]
fn poor_feedback_moves_threshold() {
    let mut session = CaptionSession::new(unbounded_config()).unwrap();
    let chunk = ChunkInput::text_only("点击链接", 0.8, 1.0);

    let before = session.process_chunk(&chunk, None);
    assert_eq!(before.threshold_update.factors.historical, 0.0);

    // Accuracy well below target, rising with the threshold
    for i in 0..12 {
        let th = 0.5 + 0.01 * i as f32;
        let m = 0.45 + 0.01 * i as f32;
        session.record_feedback(PerformanceSample::from_prf(m, m, m), th);
    }
    let after = session.process_chunk(&chunk, None);
    assert!(after.threshold_update.factors.historical < 0.0);
    assert!(after.threshold < before.threshold);
}

#[test]
fn forced_flush_and_reset() {
    let mut session = CaptionSession::new(unbounded_config()).unwrap();
    let mumble = ChunkInput::text_only("饕餮魑魅", 0.05, 0.8);

    assert_eq!(session.process_chunk(&mumble, None).decision, GateDecision::Rejected);
    let flushed = session.process_chunk(&mumble, Some(ForceReason::EndOfStream));
    assert_eq!(flushed.decision, GateDecision::ForcedAccept(ForceReason::EndOfStream));
    assert!(flushed.accepted());

    session.record_feedback(PerformanceSample::from_prf(0.7, 0.7, 0.7), 0.6);
    session.reset();

    let base = session.config().threshold.base_threshold;
    assert_eq!(session.threshold_state(), &ThresholdState::new(base));
    assert_eq!(session.threshold_state().component_factors.audio, 0.0);
    assert_eq!(session.stats().chunks, 0);
    assert!(session.controller().history().is_empty());
    assert!(session.fusion().token_history().is_empty());
}

#[test]
fn degenerate_chunks_never_fail() {
    let mut session = CaptionSession::new(unbounded_config()).unwrap();
    let chunks = [
        ChunkInput::default(),
        ChunkInput::text_only("", 0.5, 0.0).with_audio(vec![0.0; 4000], SR),
        ChunkInput::text_only("你好", f32::NAN, -1.0).with_audio(vec![f32::NAN; 800], SR),
        ChunkInput::text_only("ok", 2.0, 1.0).with_audio(vec![0.5; 10], 0),
    ];
    for chunk in &chunks {
        let out = session.process_chunk(chunk, None);
        assert!((0.0..=1.0).contains(&out.breakdown.final_confidence));
        assert!((MIN_THRESHOLD..=MAX_THRESHOLD).contains(&out.threshold));
        assert!(out.breakdown.is_degraded());
    }
    assert_eq!(session.stats().degraded, chunks.len() as u64);
}

#[test]
fn extractor_defaults_are_deterministic() {
    let estimator = AudioQualityEstimator::new();
    let a = estimator.estimate(&[], SR);
    let b = estimator.estimate(&[], SR);
    assert_eq!(a, b);
    assert_eq!(a.value, AudioQuality::neutral(SR));
    assert!(a.is_defaulted());

    let prosody = ProsodyExtractor::new();
    let p = prosody.extract(&[], SR);
    assert_eq!(p, prosody.extract(&[], SR));
    assert_eq!(p.value, ProsodyFeatures::default());
    assert!(p.is_defaulted());
}

#[test]
fn threshold_updates_stay_bounded() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    for _ in 0..20 {
        let config = ThresholdConfig {
            base_threshold: rng.gen_range(MIN_THRESHOLD..=MAX_THRESHOLD),
            audio_quality_weight: rng.gen_range(0.0..2.0),
            emotion_intensity_weight: rng.gen_range(0.0..2.0),
            historical_weight: rng.gen_range(0.0..2.0),
            real_time_weight: rng.gen_range(0.0..2.0),
            quality_sensitivity: rng.gen_range(0.0..1.0),
            emotion_sensitivity: rng.gen_range(0.0..1.0),
            adaptation_speed: rng.gen_range(0.0..0.3),
            ..ThresholdConfig::default()
        };
        let mut controller = AdaptiveThresholdController::new(config).unwrap();
        let speed = controller.config().adaptation_speed;

        for step in 0..50 {
            if step % 3 == 0 {
                let used = rng.gen_range(MIN_THRESHOLD..=MAX_THRESHOLD);
                controller.record_performance(random_sample(&mut rng), used);
            }
            let quality = random_quality(&mut rng);
            let emotion = random_emotion(&mut rng);
            let breakdown = ConfidenceBreakdown::passthrough(rng.gen());

            let update = controller.update(
                rng.gen_bool(0.8).then_some(&quality),
                rng.gen_bool(0.8).then_some(&emotion),
                rng.gen_bool(0.8).then_some(&breakdown),
            );
            assert!(update.total_adjustment.abs() <= speed + 1e-6, "{update:?}");
            let th = controller.current_threshold();
            assert!((MIN_THRESHOLD..=MAX_THRESHOLD).contains(&th));
            assert!((0.0..=1.0).contains(&update.confidence_level));
        }
    }
}

#[test]
fn fused_confidence_stays_in_unit_range() {
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..20 {
        let config = FusionConfig {
            recognizer_weight: rng.gen_range(0.0..3.0),
            word_frequency_weight: rng.gen_range(0.0..3.0),
            context_weight: rng.gen_range(0.0..3.0),
            audio_quality_weight: rng.gen_range(0.0..3.0),
            ..FusionConfig::default()
        };
        let weight_sum: f32 = config.validate().unwrap().weights().iter().sum();
        assert!((weight_sum - 1.0).abs() < 1e-6);

        let engine =
            ConfidenceFusionEngine::new(config, TextConfig::default(), Lexicon::builtin()).unwrap();
        for _ in 0..50 {
            let mut inputs = FusionInputs::new(rng.gen(), rng.gen(), rng.gen(), rng.gen());
            inputs.emotion = Some(capgate::Scored::computed(random_emotion(&mut rng)));
            inputs.emotion_lexicon_hits = rng.gen_range(0..10);
            let b = engine.fuse(&inputs);
            assert!((0.0..=1.0).contains(&b.final_confidence), "{b:?}");
            assert!(b.emotion_boost <= 0.15 + 1e-6);
        }
    }
}

#[test]
fn all_zero_weights_fall_back_to_equal() {
    let config = FusionConfig {
        recognizer_weight: 0.0,
        word_frequency_weight: 0.0,
        context_weight: 0.0,
        audio_quality_weight: 0.0,
        ..FusionConfig::default()
    };
    let weights = config.validate().unwrap().weights();
    for w in weights {
        assert!((w - 0.25).abs() < 1e-6);
    }
}

#[test]
fn sessions_are_independent() {
    let script = ["今天的价格真的很优惠", "赶紧点击链接下单", "这个颜色很好看"];
    let run = || {
        let mut session = CaptionSession::new(unbounded_config()).unwrap();
        script
            .iter()
            .map(|t| {
                session
                    .process_chunk(&ChunkInput::text_only(*t, 0.8, 1.2), None)
                    .breakdown
            })
            .collect::<Vec<_>>()
    };
    let (a, b) = std::thread::scope(|s| {
        let a = s.spawn(run);
        let b = s.spawn(run);
        (a.join().unwrap(), b.join().unwrap())
    });
    assert_eq!(a, b);
}

#[test]
#[cfg_attr(debug_assertions, ignore = "latency budget assumes an optimized build")]
fn default_budget_covers_voiced_chunks() {
    let mut rng = StdRng::seed_from_u64(3);
    let mut session = CaptionSession::new(EngineConfig::default()).unwrap();
    // first chunk pays for allocator and cache warm-up
    session.process_chunk(
        &ChunkInput::text_only("大家好", 0.9, 0.5).with_audio(speech_like(0.5, 0.3, 0.005, &mut rng), SR),
        None,
    );

    for secs in [0.5f32, 1.0, 2.0] {
        let chunk = ChunkInput::text_only("家人们,这个价格非常优惠,赶紧下单", 0.9, secs)
            .with_audio(speech_like(secs, 0.3, 0.005, &mut rng), SR);
        let out = session.process_chunk(&chunk, None);
        assert!(
            !out.deadline_exceeded,
            "{secs} s chunk took {:?}, degraded {:?}",
            out.elapsed,
            out.breakdown.degraded
        );
        assert!(out.breakdown.degraded.is_empty(), "{secs} s: {:?}", out.breakdown.degraded);
        assert!(out.prosody.as_ref().map_or(false, |p| !p.is_defaulted()));
    }
}

#[test]
fn spent_budget_keeps_text_scores() {
    let mut rng = StdRng::seed_from_u64(5);
    let text = "家人们,点击链接,这个价格非常优惠";
    let long_chunk = ChunkInput::text_only(text, 0.9, 20.0)
        .with_audio(speech_like(20.0, 0.3, 0.005, &mut rng), SR);

    let mut tight = CaptionSession::new(EngineConfig {
        latency_budget_ms: 1,
        ..EngineConfig::default()
    })
    .unwrap();
    let out = tight.process_chunk(&long_chunk, None);

    // 20 s of audio cannot clear every acoustic stage in 1 ms
    assert!(out.deadline_exceeded);
    assert_eq!(
        out.emotion.provenance,
        Provenance::Defaulted(DegradeReason::DeadlineExceeded)
    );
    assert!(!out.breakdown.degraded.contains(&Component::WordFrequency));
    assert!(!out.breakdown.degraded.contains(&Component::ContextCoherence));
    assert_eq!(tight.stats().deadline_misses, 1);

    // text scores match an unbounded session on the same chunk
    let mut open = CaptionSession::new(unbounded_config()).unwrap();
    let reference = open
        .process_chunk(&ChunkInput::text_only(text, 0.9, 20.0), None)
        .breakdown;
    assert_eq!(out.breakdown.word_frequency_score, reference.word_frequency_score);
    assert_eq!(out.breakdown.context_coherence_score, reference.context_coherence_score);
}
