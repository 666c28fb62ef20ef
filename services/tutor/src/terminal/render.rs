//! services/tutor/src/terminal/render.rs
//!
//! Turns the application state into text for the terminal. Pure functions only;
//! the session loop decides when to print.

use chrono::{Local, TimeZone, Utc};
use professor_core::chat::GREETING;
use professor_core::domain::{AnalysisSession, ChatSession, Sender};
use professor_core::router::{MainView, ResultsView, Screen};
use professor_core::{ChatEngine, StudyApp};
use regex::Regex;
use std::fmt::Write;
use std::sync::OnceLock;

const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";
const RULE: &str = "────────────────────────────────────────────────────────────";
const PREVIEW_CHARS: usize = 80;

//=========================================================================================
// Markdown
//=========================================================================================

fn bold_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\*\*(.+?)\*\*").ok())
        .as_ref()
}

/// Replaces `**bold**` spans with terminal bold.
pub fn emphasize(text: &str) -> String {
    match bold_pattern() {
        Some(re) => re
            .replace_all(text, format!("{}$1{}", BOLD, RESET).as_str())
            .into_owned(),
        None => text.to_string(),
    }
}

/// Renders the markdown subset explanations use: headings, bullets, bold.
pub fn render_markdown(text: &str, indent: &str) -> String {
    let mut out = String::new();
    for line in text.lines() {
        let trimmed = line.trim_start();
        let rendered = if let Some(heading) = trimmed.strip_prefix('#') {
            format!("{}{}{}", BOLD, heading.trim_start_matches('#').trim(), RESET)
        } else if let Some(item) = trimmed.strip_prefix("* ").or_else(|| trimmed.strip_prefix("- ")) {
            format!("  • {}", emphasize(item))
        } else {
            emphasize(line)
        };
        let _ = writeln!(out, "{}{}", indent, rendered);
    }
    out
}

pub fn format_timestamp(millis: i64) -> String {
    match Utc.timestamp_millis_opt(millis).single() {
        Some(at) => at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string(),
        None => millis.to_string(),
    }
}

fn preview(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= PREVIEW_CHARS {
        return flat;
    }
    let cut: String = flat.chars().take(PREVIEW_CHARS).collect();
    format!("{}…", cut)
}

//=========================================================================================
// Screens
//=========================================================================================

pub fn splash() -> String {
    format!("\n  {}Professor AI{}\n  Your personal AI tutor\n\n  Loading...\n", BOLD, RESET)
}

/// The remediation screen shown when required configuration is missing.
pub fn configuration_error(missing: &[String]) -> String {
    let mut out = format!("\n{}Configuration Error{}\n{}\n", BOLD, RESET, RULE);
    out.push_str("Professor AI cannot start because required settings are missing or invalid:\n\n");
    for name in missing {
        let _ = writeln!(out, "  • {}", name);
    }
    out.push_str(
        "\nSet them in your environment or in a .env file next to the program, then restart.\n\
         An AI key is required: set OPENAI_API_KEY, or GEMINI_API_KEY to use Gemini.\n",
    );
    out
}

pub fn screen(app: &StudyApp) -> String {
    match app.router().screen() {
        Screen::Splash => splash(),
        Screen::Login => login(app),
        Screen::Main => main_screen(app),
        Screen::History => history(app),
    }
}

fn header(app: &StudyApp, title: &str) -> String {
    let who = app
        .user()
        .map(|u| u.name.clone().or_else(|| u.email.clone()).unwrap_or_else(|| u.uid.clone()))
        .unwrap_or_default();
    format!("\n{}Professor AI{} · {}    {}{}{}\n{}\n", BOLD, RESET, title, DIM, who, RESET, RULE)
}

fn login(app: &StudyApp) -> String {
    let mut out = format!("\n{}Professor AI{} · Sign in\n{}\n", BOLD, RESET, RULE);
    if let Some(notice) = app.router().login_notice() {
        let _ = writeln!(out, "! {}\n", notice.message);
    }
    out.push_str(
        "  /login <email>              sign in with your password\n\
         \x20 /signup <email> [name]      create an account\n\
         \x20 /link <email> <link>        finish an email sign-in link\n\
         \x20 /otp <phone> <code>         finish a phone sign-in\n\
         \x20 /quit\n",
    );
    out
}

fn main_screen(app: &StudyApp) -> String {
    let mut out = header(app, "Study");
    match app.router().main_view() {
        MainView::Input => {
            out.push_str("Paste or type the content you want to study, then run /analyze.\n");
            let chars = app.content_text().chars().count();
            if chars > 0 {
                let _ = writeln!(out, "{}{} characters ready.{}", DIM, chars, RESET);
            }
            out.push_str("Commands: /analyze  /history  /chat  /help\n");
        }
        MainView::Loading => {
            out.push_str("Professor AI is analyzing your content...\n");
            let _ = writeln!(out, "{}This may take a moment. Press Ctrl-C to cancel.{}", DIM, RESET);
        }
        MainView::Results(view) => {
            out.push_str(&results(view));
            out.push_str("Commands: /open <n>  /ask <passage>  /export  /reset  /history  /chat\n");
        }
        MainView::Error(message) => {
            let _ = writeln!(out, "{}Error:{} {}", BOLD, RESET, message);
            out.push_str("Type /reset to try again.\n");
        }
    }
    out
}

/// The chapter accordion. Collapsed chapters list only their title.
pub fn results(view: &ResultsView) -> String {
    let chapters = &view.result().chapters;
    if chapters.is_empty() {
        return "No chapters were found in this content.\n".to_string();
    }

    let mut out = format!("{}Your Personal Study Guide{}\n\n", BOLD, RESET);
    for (i, chapter) in chapters.iter().enumerate() {
        let expanded = view.is_expanded(i);
        let _ = writeln!(
            out,
            "[{}] {} {}{}{} ({} topics)",
            i + 1,
            if expanded { "▾" } else { "▸" },
            BOLD,
            chapter.title,
            RESET,
            chapter.topics.len()
        );
        if !expanded {
            continue;
        }
        for topic in &chapter.topics {
            let _ = writeln!(out, "\n    {}{}{}", BOLD, topic.title, RESET);
            out.push_str(&render_markdown(&topic.explanation, "    "));
        }
        out.push('\n');
    }
    out
}

fn history(app: &StudyApp) -> String {
    let mut out = header(app, "History");
    out.push_str(&analysis_list(&app.history().analyses()));
    out.push_str("Commands: /select <n>  /delete <n>  /clear  /chats  /view-chat <n>  /back\n");
    out
}

pub fn analysis_list(sessions: &[AnalysisSession]) -> String {
    if sessions.is_empty() {
        return "No past analyses yet.\n".to_string();
    }
    let mut out = String::new();
    for (i, session) in sessions.iter().enumerate() {
        let _ = writeln!(
            out,
            "[{}] {}  {}",
            i + 1,
            format_timestamp(session.timestamp),
            preview(&session.content_text)
        );
    }
    out
}

pub fn chat_list(sessions: &[ChatSession]) -> String {
    if sessions.is_empty() {
        return "No saved chats yet.\n".to_string();
    }
    let mut out = String::new();
    for (i, session) in sessions.iter().enumerate() {
        let opening = session
            .messages
            .iter()
            .find(|m| m.sender == Sender::User)
            .map(|m| preview(&m.text))
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "[{}] {}  {} messages  {}",
            i + 1,
            format_timestamp(session.timestamp),
            session.messages.len(),
            opening
        );
    }
    out
}

/// One saved chat, message by message.
pub fn chat_transcript(number: usize, session: &ChatSession) -> String {
    let mut out = format!(
        "\n{}Saved chat {}{} · {}\n{}\n",
        BOLD,
        number,
        RESET,
        format_timestamp(session.timestamp),
        RULE
    );
    if session.messages.is_empty() {
        out.push_str("This chat has no messages.\n");
    }
    for message in &session.messages {
        out.push_str(&chat_message(message.sender, &message.text));
    }
    out
}

//=========================================================================================
// Chat panel
//=========================================================================================

pub fn chat_opened(chat: &ChatEngine) -> String {
    let mut out = format!("\n{}Chat with Professor AI{}\n{}\n", BOLD, RESET, RULE);
    let _ = writeln!(out, "Professor AI: {}", GREETING);
    for message in chat.transcript() {
        out.push_str(&chat_message(message.sender, &message.text));
    }
    if chat.input().is_empty() {
        let _ = writeln!(out, "{}Type a question, or /close to end the chat.{}", DIM, RESET);
    } else {
        let _ = writeln!(out, "Your question: {}", chat.input());
        let _ = writeln!(
            out,
            "{}Press Enter to send it, or type a different question.{}",
            DIM, RESET
        );
    }
    out
}

pub fn chat_message(sender: Sender, text: &str) -> String {
    match sender {
        Sender::User => format!("You: {}\n", text),
        Sender::Bot => format!("Professor AI: {}\n", emphasize(text)),
    }
}

pub fn help(screen: &Screen, chat_open: bool) -> String {
    let mut out = String::from("\nCommands\n");
    match screen {
        Screen::Login => out.push_str(
            "  /login <email>  /signup <email> [name]  /link <email> <link>  /otp <phone> <code>\n",
        ),
        Screen::History => out.push_str(
            "  /select <n>    reopen an analysis\n\
             \x20 /delete <n>    delete an analysis\n\
             \x20 /clear         delete all analyses\n\
             \x20 /chats         list saved chats\n\
             \x20 /view-chat <n> read a saved chat\n\
             \x20 /delete-chat <n>\n\
             \x20 /back          return to the study screen\n",
        ),
        _ => out.push_str(
            "  <text>         add content (or talk to the tutor while the chat is open)\n\
             \x20 /analyze       build the study guide\n\
             \x20 /open <n>      expand or collapse a chapter\n\
             \x20 /ask <passage> ask the tutor about a passage\n\
             \x20 /export        save the study guide as markdown\n\
             \x20 /reset         start over\n\
             \x20 /history       past analyses and chats\n\
             \x20 /chat          open the tutor chat\n\
             \x20 /logout\n",
        ),
    }
    if chat_open {
        out.push_str("  /close         close the chat\n");
    }
    out.push_str("  /quit\n");
    out
}
