//! Deterministic beam search over next-token logits.
//!
//! The decoder is abstracted as a closure from the token prefix to the logits
//! of the next position, so the search runs identically against a real model
//! and against hand-written score tables.

use anyhow::{Result, bail};
use std::cmp::Ordering;

use pdfkb_core::traits::GenerationParams;

#[derive(Debug, Clone)]
struct Beam {
    tokens: Vec<u32>,
    logprob: f32,
}

#[derive(Debug, Clone)]
struct Hypothesis {
    tokens: Vec<u32>,
    score: f32,
}

/// Finished hypotheses, capped at `capacity` best by length-normalised score.
struct Finished {
    capacity: usize,
    length_penalty: f32,
    hyps: Vec<Hypothesis>,
}

impl Finished {
    fn new(capacity: usize, length_penalty: f32) -> Self {
        Self { capacity, length_penalty, hyps: Vec::with_capacity(capacity + 1) }
    }

    fn normalise(&self, logprob: f32, len: usize) -> f32 {
        logprob / (len.max(1) as f32).powf(self.length_penalty)
    }

    fn add(&mut self, tokens: Vec<u32>, logprob: f32, len: usize) {
        let score = self.normalise(logprob, len);
        self.hyps.push(Hypothesis { tokens, score });
        if self.hyps.len() > self.capacity {
            self.hyps.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
            self.hyps.truncate(self.capacity);
        }
    }

    fn is_full(&self) -> bool { self.hyps.len() >= self.capacity }

    fn worst(&self) -> Option<f32> {
        self.hyps.iter().map(|h| h.score).min_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal))
    }

    fn best(self) -> Option<Hypothesis> {
        self.hyps.into_iter().max_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(Ordering::Equal))
    }
}

/// Run beam search from `start_token` until every beam has emitted
/// `eos_token` or the sequence (start token included) reaches
/// `params.max_length`.
///
/// Returns the generated tokens of the best hypothesis without the start
/// token and without the terminating EOS.
pub fn beam_search<F>(params: &GenerationParams, start_token: u32, eos_token: u32, mut next_logits: F) -> Result<Vec<u32>>
where
    F: FnMut(&[u32]) -> Result<Vec<f32>>,
{
    let num_beams = params.num_beams.max(1);
    let max_length = params.max_length.max(2);
    let mut beams = vec![Beam { tokens: vec![start_token], logprob: 0.0 }];
    let mut finished = Finished::new(num_beams, params.length_penalty);

    while let Some(cur_len) = beams.first().map(|b| b.tokens.len()) {
        if cur_len >= max_length { break; }
        let mut candidates: Vec<(f32, usize, u32)> = Vec::with_capacity(beams.len() * 2 * num_beams);
        for (index, beam) in beams.iter().enumerate() {
            let mut logits = next_logits(&beam.tokens)?;
            if (eos_token as usize) >= logits.len() {
                bail!("eos token {} outside vocabulary of {}", eos_token, logits.len());
            }
            apply_repetition_penalty(&mut logits, &beam.tokens[1..], params.repetition_penalty);
            if params.temperature > 0.0 && params.temperature != 1.0 {
                for l in logits.iter_mut() { *l /= params.temperature; }
            }
            if beam.tokens.len() - 1 < params.min_length {
                logits[eos_token as usize] = f32::NEG_INFINITY;
            }
            let logprobs = log_softmax(&logits);
            for (token, lp) in top_k(&logprobs, 2 * num_beams) {
                if lp.is_finite() { candidates.push((beam.logprob + lp, index, token as u32)); }
            }
        }
        candidates.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));

        let mut next = Vec::with_capacity(num_beams);
        for (rank, (logprob, index, token)) in candidates.into_iter().enumerate() {
            let prefix = &beams[index].tokens;
            if token == eos_token {
                // only EOS among the top `num_beams` candidates closes a hypothesis
                if rank < num_beams { finished.add(prefix[1..].to_vec(), logprob, prefix.len()); }
            } else {
                let mut tokens = prefix.clone();
                tokens.push(token);
                next.push(Beam { tokens, logprob });
            }
            if next.len() == num_beams { break; }
        }
        beams = next;

        if finished.is_full() {
            if params.early_stopping { break; }
            let best_running = beams.iter().map(|b| finished.normalise(b.logprob, b.tokens.len())).fold(f32::NEG_INFINITY, f32::max);
            if finished.worst().is_some_and(|w| w >= best_running) { break; }
        }
    }

    // sequences cut off by max_length still compete
    if !finished.is_full() || finished.hyps.is_empty() {
        for beam in beams {
            let len = beam.tokens.len();
            finished.add(beam.tokens[1..].to_vec(), beam.logprob, len);
        }
    }
    Ok(finished.best().map(|h| h.tokens).unwrap_or_default())
}

/// Penalise tokens already generated: positive logits are divided by
/// `penalty`, negative ones multiplied.
pub fn apply_repetition_penalty(logits: &mut [f32], generated: &[u32], penalty: f32) {
    if penalty == 1.0 { return; }
    let mut seen = std::collections::HashSet::new();
    for &token in generated {
        let i = token as usize;
        if i >= logits.len() || !seen.insert(i) { continue; }
        logits[i] = if logits[i] < 0.0 { logits[i] * penalty } else { logits[i] / penalty };
    }
}

pub fn log_softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() { return vec![f32::NEG_INFINITY; logits.len()]; }
    let sum: f32 = logits.iter().map(|l| (l - max).exp()).sum();
    let lse = max + sum.ln();
    logits.iter().map(|l| l - lse).collect()
}

/// Indices and values of the `k` largest entries, largest first.
fn top_k(values: &[f32], k: usize) -> Vec<(usize, f32)> {
    let mut indexed: Vec<(usize, f32)> = values.iter().copied().enumerate().collect();
    let by_value = |a: &(usize, f32), b: &(usize, f32)| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal);
    if k < indexed.len() {
        indexed.select_nth_unstable_by(k, by_value);
        indexed.truncate(k);
    }
    indexed.sort_by(by_value);
    indexed
}
