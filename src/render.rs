use html_escape::{encode_double_quoted_attribute as attr, encode_text as text};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use std::{fmt::Write as _, time::Duration};

use crate::{
    error::{AppError, AppResult},
    locator::{self, StorageLocator},
    quiz::{self, QuizQuestion},
    session::{HistoryEntry, Outcome, Progress, QuizInstance, Session},
    storage::ObjectStore,
    timestamp,
    workflow::SearchResultItem,
};

#[derive(Debug, Clone)]
pub struct VideoView {
    pub url: String,
    pub start_offset: u64,
}

#[derive(Debug, Clone)]
pub enum QuizRegion {
    Absent,
    Failed(String),
    Ready(QuizInstance),
}

#[derive(Debug, Clone)]
pub struct ItemView {
    pub item_id: usize,
    pub title: Option<String>,
    pub description: Option<String>,
    pub video: Result<VideoView, String>,
    pub quiz: QuizRegion,
}

/// Outbound work for one item, before it is tied to a session.
pub struct PreparedItem {
    item_id: usize,
    item: SearchResultItem,
    video: Result<VideoView, String>,
    quiz: Option<Result<(StorageLocator, Vec<QuizQuestion>), String>>,
}

async fn resolve_video(
    store: &dyn ObjectStore,
    item: &SearchResultItem,
    ttl: Duration,
) -> AppResult<VideoView> {
    let loc: StorageLocator = item
        .content_locator
        .as_deref()
        .ok_or(AppError::MissingField("s3_url"))?
        .parse()?;
    let start_offset = timestamp::parse_seek_offset(
        item.start_timestamp
            .as_deref()
            .ok_or(AppError::MissingField("start_time"))?,
    )?;
    let url = locator::resolve(store, &loc, ttl).await?;
    Ok(VideoView { url, start_offset })
}

async fn load_quiz(
    store: &dyn ObjectStore,
    raw: &str,
) -> AppResult<(StorageLocator, Vec<QuizQuestion>)> {
    let loc: StorageLocator = raw.parse()?;
    let questions = quiz::fetch_quiz(store, &loc).await?;
    Ok((loc, questions))
}

/// Resolves the video and fetches the quiz. Failures are kept per region so
/// one bad item never stops the others.
pub async fn prepare_item(
    store: &dyn ObjectStore,
    ttl: Duration,
    item_id: usize,
    item: SearchResultItem,
) -> PreparedItem {
    let quiz = match item.quiz_locator.as_deref() {
        Some(raw) => Some(load_quiz(store, raw).await.map_err(|e| {
            tracing::warn!(item = item_id, error = %e, "quiz unavailable");
            e.to_string()
        })),
        None => None,
    };

    let video = resolve_video(store, &item, ttl).await.map_err(|e| {
        tracing::warn!(item = item_id, error = %e, "video unavailable");
        e.to_string()
    });

    PreparedItem { item_id, item, video, quiz }
}

impl PreparedItem {
    pub fn attach(self, session: &mut Session) -> ItemView {
        let quiz = match self.quiz {
            None => QuizRegion::Absent,
            Some(Err(e)) => QuizRegion::Failed(e),
            Some(Ok((loc, questions))) => {
                QuizRegion::Ready(session.init_quiz(self.item_id, &loc, questions).clone())
            }
        };
        ItemView {
            item_id: self.item_id,
            title: self.item.title,
            description: self.item.description,
            video: self.video,
            quiz,
        }
    }
}

pub fn progress_summary(p: &Progress) -> String {
    if p.completed {
        format!("Quiz completed! Your score: {}/{}", p.score, p.total)
    } else {
        format!(
            "Questions answered: {}/{} · Current score: {}/{}",
            p.answered_count, p.total, p.score, p.total
        )
    }
}

pub fn outcome_message(o: &Outcome) -> String {
    match o {
        Outcome::Correct => "Correct!".to_string(),
        Outcome::Incorrect { correct } => format!("Wrong. The correct answer is: {}", correct),
    }
}

fn quiz_html(item_id: usize, quiz: &QuizInstance) -> String {
    let mut out = String::new();
    for (i, q) in quiz.questions.iter().enumerate() {
        let answer = quiz.state.answer(i);
        let _ = write!(
            out,
            "<div class='question' id='q{i}_{item_id}'><h5>Question {n}: {prompt}</h5>",
            n = i + 1,
            prompt = text(&q.prompt)
        );
        for o in &q.options {
            let checked = answer.map_or(false, |a| a.option == o.index);
            let _ = write!(
                out,
                "<label><input type='checkbox' data-item='{item_id}' data-question='{i}' data-option='{idx}'{checked}{disabled}/> {content}</label>",
                idx = o.index,
                checked = if checked { " checked" } else { "" },
                disabled = if answer.is_some() { " disabled" } else { "" },
                content = text(&o.content)
            );
        }
        let (class, msg) = match answer.map(|a| &a.outcome) {
            Some(o @ Outcome::Correct) => ("ok", outcome_message(o)),
            Some(o) => ("err", outcome_message(o)),
            None => ("", String::new()),
        };
        let _ = write!(out, "<div class='feedback {class}'>{}</div></div><hr/>", text(&msg));
    }
    let progress = quiz.state.progress();
    let _ = write!(
        out,
        "<div class='summary {cls}' id='summary_{item_id}'>{}</div>",
        text(&progress_summary(&progress)),
        cls = if progress.completed { "ok" } else { "info" }
    );
    out
}

pub fn item_html(view: &ItemView) -> String {
    let mut left = String::new();
    if let Some(title) = &view.title {
        let _ = write!(left, "<h3>{}</h3>", text(title));
    }
    match &view.video {
        Ok(v) => {
            let src = format!("{}#t={}", v.url, v.start_offset);
            let _ = write!(
                left,
                "<video controls preload='metadata' src=\"{}\"></video><small>from {}</small>",
                attr(&src),
                timestamp::format_seek_offset(v.start_offset)
            );
        }
        Err(e) => {
            let _ = write!(left, "<div class='err'>Error displaying video: {}</div>", text(e));
        }
    }
    if let Some(desc) = &view.description {
        let _ = write!(left, "<p class='caption'>{}</p>", text(desc));
    }

    let right = match &view.quiz {
        QuizRegion::Absent => String::new(),
        QuizRegion::Failed(e) => format!(
            "<details><summary>Related quiz</summary><div class='err'>Quiz unavailable: {}</div></details>",
            text(e)
        ),
        QuizRegion::Ready(q) => format!(
            "<details><summary>Related quiz</summary><h3>Show Time</h3>{}</details>",
            quiz_html(view.item_id, q)
        ),
    };

    format!(
        "<section class='item'><div class='video'>{left}</div><div class='quiz'>{right}</div></section><hr/>"
    )
}

pub fn error_banner(msg: &str) -> String {
    format!("<div class='err'>Workflow API error: {}</div>", text(msg))
}

fn history_html(history: &[HistoryEntry]) -> String {
    if history.is_empty() {
        return String::new();
    }
    let mut out = String::from("<aside><h4>Earlier questions</h4><ul>");
    for h in history.iter().rev() {
        let q = utf8_percent_encode(&h.query, NON_ALPHANUMERIC).to_string();
        let _ = write!(
            out,
            "<li><a href=\"/search?q={}\">{}</a> <small>{} · {} results</small></li>",
            attr(&q),
            text(&h.query),
            h.asked_at.format("%H:%M:%S"),
            h.result_count
        );
    }
    out.push_str("</ul></aside>");
    out
}

pub fn search_page(query: Option<&str>, history: &[HistoryEntry], content: &str) -> String {
    let query = query.unwrap_or("");
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <meta charset='utf-8'/>
  <title>Knowledge Video Search</title>
  <style>
    body{{font-family:sans-serif;margin:0 24px}}
    header{{display:flex;align-items:center;gap:16px}}
    header img{{width:80px}}
    form input[type=text]{{width:60%;padding:6px}}
    .item{{display:flex;gap:24px}}
    .video{{flex:2}} .quiz{{flex:1}}
    video{{width:100%}}
    .caption{{color:#666;font-size:0.9em}}
    .question label{{display:block}}
    .ok{{color:#1a7f37}} .err{{color:#b42318}} .info{{color:#175cd3}}
    aside{{float:right;width:22%;font-size:0.9em}}
  </style>
</head>
<body>
<header><img src='/static/logo.png' alt=''/><h1>Knowledge Search</h1></header>
{history}
<form action='/search' method='get'>
  <label>Your question: <input type='text' name='q' value="{query}"/></label>
  <button type='submit'>Search</button>
</form>
<main>{content}</main>
<script>
(function(){{
  function message(o){{
    return o.result === 'correct' ? 'Correct!' : 'Wrong. The correct answer is: ' + o.correct;
  }}
  function summary(p){{
    return p.completed
      ? 'Quiz completed! Your score: ' + p.score + '/' + p.total
      : 'Questions answered: ' + p.answered_count + '/' + p.total + ' · Current score: ' + p.score + '/' + p.total;
  }}
  document.querySelectorAll("input[type=checkbox][data-item]").forEach(function(box){{
    box.addEventListener('change', async function(){{
      const item = box.dataset.item, question = Number(box.dataset.question);
      const res = await fetch('/api/quiz/' + item + '/answer', {{
        method: 'POST',
        headers: {{'content-type': 'application/json'}},
        body: JSON.stringify({{question: question, option: Number(box.dataset.option)}})
      }});
      if (!res.ok) {{ return; }}
      const j = await res.json();
      const block = document.getElementById('q' + question + '_' + item);
      block.querySelectorAll('input').forEach(function(i){{ i.disabled = true; }});
      const fb = block.querySelector('.feedback');
      fb.textContent = message(j.outcome);
      fb.className = 'feedback ' + (j.outcome.result === 'correct' ? 'ok' : 'err');
      const s = document.getElementById('summary_' + item);
      s.textContent = summary(j.progress);
      s.className = 'summary ' + (j.progress.completed ? 'ok' : 'info');
    }});
  }});
}})();
</script>
</body>
</html>"#,
        history = history_html(history),
        query = attr(query),
        content = content
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quiz::tests::{generator_document, two_question_text};
    use crate::storage::MemoryStore;

    fn item(video: &str, quiz: Option<&str>, start: &str) -> SearchResultItem {
        SearchResultItem {
            content_locator: Some(video.into()),
            quiz_locator: quiz.map(str::to_string),
            title: Some("Log rotation".into()),
            description: Some("Rotating & pruning <logs>".into()),
            start_timestamp: Some(start.into()),
        }
    }

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store.put("quizzes", "logs.json", generator_document(&two_question_text()));
        store
    }

    const TTL: Duration = Duration::from_secs(600);

    #[tokio::test]
    async fn renders_video_with_seek_and_quiz() {
        let store = store();
        let mut session = Session::default();
        let view = prepare_item(&store, TTL, 0, item("s3://media/logs.mp4", Some("s3://quizzes/logs.json"), "00:13:57"))
            .await
            .attach(&mut session);

        let video = view.video.as_ref().unwrap();
        assert_eq!(video.url, "memory://media/logs.mp4?expires=600");
        assert_eq!(video.start_offset, 837);
        assert!(matches!(&view.quiz, QuizRegion::Ready(q) if q.questions.len() == 2));
        assert!(session.quiz(0).is_some());

        let html = item_html(&view);
        assert!(html.contains("#t=837"));
        assert!(html.contains("from 00:13:57"));
        assert!(html.contains("Question 2: Default retention?"));
        assert!(html.contains("Rotating &amp; pruning &lt;logs&gt;"));
        assert!(html.contains("Questions answered: 0/2"));
    }

    #[tokio::test]
    async fn quiz_failure_keeps_video() {
        let store = store();
        let mut session = Session::default();
        let view = prepare_item(&store, TTL, 0, item("s3://media/logs.mp4", Some("s3://quizzes/gone.json"), "00:00:05"))
            .await
            .attach(&mut session);

        assert!(view.video.is_ok());
        assert!(matches!(view.quiz, QuizRegion::Failed(_)));
        assert!(session.quiz(0).is_none());
        assert!(item_html(&view).contains("Quiz unavailable"));
    }

    #[tokio::test]
    async fn bad_video_locator_degrades_inline() {
        let store = store();
        let mut session = Session::default();
        let view = prepare_item(&store, TTL, 3, item("https://cdn/logs.mp4", Some("s3://quizzes/logs.json"), "00:00:05"))
            .await
            .attach(&mut session);

        assert!(view.video.as_ref().unwrap_err().contains("scheme"));
        assert!(matches!(view.quiz, QuizRegion::Ready(_)));
        assert!(item_html(&view).contains("Error displaying video"));
    }

    #[tokio::test]
    async fn signing_failure_degrades_inline() {
        let store = store().deny_signing();
        let mut session = Session::default();
        let view = prepare_item(&store, TTL, 0, item("s3://media/logs.mp4", None, "00:00:05"))
            .await
            .attach(&mut session);

        assert!(view.video.is_err());
        assert!(matches!(view.quiz, QuizRegion::Absent));
    }

    #[tokio::test]
    async fn answered_question_renders_locked() {
        let store = store();
        let mut session = Session::default();
        let item = item("s3://media/logs.mp4", Some("s3://quizzes/logs.json"), "00:00:05");
        prepare_item(&store, TTL, 0, item.clone()).await.attach(&mut session);
        session.select_option(0, 1, 0).unwrap();

        let view = prepare_item(&store, TTL, 0, item).await.attach(&mut session);
        let html = item_html(&view);
        assert!(html.contains("data-question='1' data-option='0' checked disabled"));
        assert!(html.contains("Wrong. The correct answer is: 30 days"));
        assert!(html.contains("Questions answered: 1/2"));
    }

    #[tokio::test]
    async fn missing_fields_degrade_inline() {
        let store = store();
        let mut session = Session::default();

        let mut no_start = item("s3://media/logs.mp4", Some("s3://quizzes/logs.json"), "");
        no_start.start_timestamp = None;
        let view = prepare_item(&store, TTL, 0, no_start).await.attach(&mut session);
        assert!(view.video.as_ref().unwrap_err().contains("start_time"));
        assert!(matches!(view.quiz, QuizRegion::Ready(_)));

        let mut no_video = item("", None, "00:00:01");
        no_video.content_locator = None;
        let view = prepare_item(&store, TTL, 1, no_video).await.attach(&mut session);
        assert!(view.video.as_ref().unwrap_err().contains("s3_url"));
        assert!(item_html(&view).contains("Error displaying video"));
    }

    #[test]
    fn summary_switches_on_completion() {
        let p = Progress { answered_count: 2, total: 2, score: 1, completed: true };
        assert_eq!(progress_summary(&p), "Quiz completed! Your score: 1/2");
    }

    #[test]
    fn page_escapes_query() {
        let html = search_page(Some("\"><script>"), &[], "");
        assert!(!html.contains("\"><script>\""));
        assert!(html.contains("&quot;&gt;&lt;script&gt;") || html.contains("&quot;>&lt;script>"));
    }
}
