use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::{
    collections::{HashMap, HashSet},
    time::Duration,
};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    locator::StorageLocator,
    quiz::QuizQuestion,
};

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Outcome {
    Correct,
    Incorrect { correct: String },
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub answered_count: usize,
    pub total: usize,
    pub score: usize,
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub option: u32,
    pub outcome: Outcome,
}

/// Answer flags and score for one quiz instance. The first selection for a
/// question is final.
#[derive(Debug, Clone)]
pub struct QuizSessionState {
    answers: Vec<Option<Answer>>,
    score: usize,
}

impl QuizSessionState {
    pub fn new(question_count: usize) -> Self {
        Self {
            answers: vec![None; question_count],
            score: 0,
        }
    }

    pub fn answered(&self) -> Vec<bool> {
        self.answers.iter().map(Option::is_some).collect()
    }

    pub fn answer(&self, question_index: usize) -> Option<&Answer> {
        self.answers.get(question_index).and_then(Option::as_ref)
    }

    pub fn select_option(
        &mut self,
        question_index: usize,
        option_index: u32,
        question: &QuizQuestion,
    ) -> AppResult<Outcome> {
        let total = self.answers.len();
        let slot = self
            .answers
            .get_mut(question_index)
            .ok_or(AppError::QuestionOutOfRange { index: question_index, total })?;

        if let Some(prior) = slot.as_ref() {
            return Ok(prior.outcome.clone());
        }

        let outcome = if option_index == question.correct_index {
            self.score += 1;
            Outcome::Correct
        } else {
            Outcome::Incorrect {
                correct: question
                    .correct_option()
                    .map(|o| o.content.clone())
                    .unwrap_or_default(),
            }
        };
        *slot = Some(Answer { option: option_index, outcome: outcome.clone() });
        Ok(outcome)
    }

    pub fn progress(&self) -> Progress {
        let answered_count = self.answered().into_iter().filter(|a| *a).count();
        Progress {
            answered_count,
            total: self.answers.len(),
            score: self.score,
            completed: answered_count == self.answers.len(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QuizInstance {
    pub locator: StorageLocator,
    pub questions: Vec<QuizQuestion>,
    pub state: QuizSessionState,
}

#[derive(Serialize, Debug, Clone)]
pub struct HistoryEntry {
    pub query: String,
    pub asked_at: DateTime<Utc>,
    pub result_count: usize,
}

/// Oldest entries are dropped past this many queries.
pub const MAX_HISTORY: usize = 50;

#[derive(Debug, Default)]
pub struct Session {
    history: Vec<HistoryEntry>,
    quizzes: HashMap<usize, QuizInstance>,
    last_seen: DateTime<Utc>,
}

impl Session {
    /// Registers the quiz rendered at `item_id`. Existing state is kept when the
    /// same quiz is rendered again; a different quiz at that slot replaces it.
    pub fn init_quiz(
        &mut self,
        item_id: usize,
        locator: &StorageLocator,
        questions: Vec<QuizQuestion>,
    ) -> &QuizInstance {
        let fresh = || QuizInstance {
            locator: locator.clone(),
            state: QuizSessionState::new(questions.len()),
            questions: questions.clone(),
        };
        let entry = self.quizzes.entry(item_id).or_insert_with(fresh);
        if entry.locator != *locator {
            *entry = fresh();
        }
        entry
    }

    pub fn quiz(&self, item_id: usize) -> Option<&QuizInstance> {
        self.quizzes.get(&item_id)
    }

    pub fn select_option(
        &mut self,
        item_id: usize,
        question_index: usize,
        option_index: u32,
    ) -> AppResult<(Outcome, Progress)> {
        let quiz = self
            .quizzes
            .get_mut(&item_id)
            .ok_or(AppError::QuizNotFound(item_id))?;
        let question = quiz.questions.get(question_index).ok_or(AppError::QuestionOutOfRange {
            index: question_index,
            total: quiz.questions.len(),
        })?;
        let outcome = quiz.state.select_option(question_index, option_index, question)?;
        Ok((outcome, quiz.state.progress()))
    }

    pub fn progress(&self, item_id: usize) -> AppResult<Progress> {
        self.quiz(item_id)
            .map(|q| q.state.progress())
            .ok_or(AppError::QuizNotFound(item_id))
    }

    /// Drops quizzes the current page no longer shows.
    pub fn retain_quizzes(&mut self, live: &HashSet<usize>) {
        self.quizzes.retain(|item_id, _| live.contains(item_id));
    }

    pub fn record_query(&mut self, query: &str, result_count: usize) {
        if self.history.len() >= MAX_HISTORY {
            self.history.drain(..=self.history.len() - MAX_HISTORY);
        }
        self.history.push(HistoryEntry {
            query: query.to_string(),
            asked_at: Utc::now(),
            result_count,
        });
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }
}

/// All live sessions, keyed by the id carried in the session cookie.
///
/// Sessions idle for longer than `idle_ttl` are gone; once `capacity` is
/// reached the least recently seen one makes room for a new one.
pub struct SessionStore {
    sessions: DashMap<Uuid, Session>,
    idle_ttl: Duration,
    capacity: usize,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(3600), 10_000)
    }
}

impl SessionStore {
    pub fn new(idle_ttl: Duration, capacity: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            idle_ttl,
            capacity: capacity.max(1),
        }
    }

    fn expired(&self, session: &Session, now: DateTime<Utc>) -> bool {
        (now - session.last_seen)
            .to_std()
            .map_or(false, |idle| idle > self.idle_ttl)
    }

    /// Returns the id to use for this request and whether it was newly issued.
    pub fn open(&self, id: Option<Uuid>) -> (Uuid, bool) {
        self.open_at(id, Utc::now())
    }

    fn open_at(&self, id: Option<Uuid>, now: DateTime<Utc>) -> (Uuid, bool) {
        if let Some(id) = id {
            if let Some(mut s) = self.sessions.get_mut(&id) {
                if !self.expired(&s, now) {
                    s.last_seen = now;
                    return (id, false);
                }
            }
        }

        self.sweep(now);
        let id = Uuid::new_v4();
        self.sessions.insert(id, Session { last_seen: now, ..Session::default() });
        tracing::debug!(session = %id, live = self.sessions.len(), "session created");
        (id, true)
    }

    fn sweep(&self, now: DateTime<Utc>) {
        self.sessions.retain(|_, s| !self.expired(s, now));
        while self.sessions.len() >= self.capacity {
            let oldest = self
                .sessions
                .iter()
                .min_by_key(|e| e.value().last_seen)
                .map(|e| *e.key());
            match oldest {
                Some(id) => {
                    self.sessions.remove(&id);
                    tracing::debug!(session = %id, "session evicted");
                }
                None => break,
            }
        }
    }

    pub fn with<R>(&self, id: Uuid, f: impl FnOnce(&mut Session) -> R) -> Option<R> {
        self.with_at(id, Utc::now(), f)
    }

    fn with_at<R>(&self, id: Uuid, now: DateTime<Utc>, f: impl FnOnce(&mut Session) -> R) -> Option<R> {
        let mut s = self.sessions.get_mut(&id)?;
        if self.expired(&s, now) {
            return None;
        }
        s.last_seen = now;
        Some(f(&mut s))
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.sessions.len()
    }
}
