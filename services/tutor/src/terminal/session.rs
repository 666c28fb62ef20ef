//! services/tutor/src/terminal/session.rs
//!
//! This is the main entry point and control loop for a terminal session.
//! It reads commands, drives the `StudyApp` and prints what changed, while also
//! following identity changes the provider publishes on its own.

use professor_core::auth::SignInRequest;
use professor_core::chat::ERROR_REPLY;
use professor_core::router::{MainView, Screen};
use professor_core::{StreamEvent, StudyApp, User};
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, Lines};
use tracing::{debug, info};

use crate::error::TutorError;
use crate::terminal::protocol::{self, Command};
use crate::terminal::render;

//=========================================================================================
// Terminal I/O
//=========================================================================================

pub struct Terminal<R, W> {
    lines: Lines<R>,
    out: W,
}

impl<R, W> Terminal<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(input: R, out: W) -> Self {
        Self { lines: input.lines(), out }
    }

    pub async fn write(&mut self, text: &str) -> io::Result<()> {
        self.out.write_all(text.as_bytes()).await?;
        self.out.flush().await
    }

    async fn prompt(&mut self, label: &str) -> io::Result<Option<String>> {
        self.write(label).await?;
        self.lines.next_line().await
    }
}

/// What the loop does after a command.
enum Flow {
    Continue,
    Redraw,
    Quit,
}

/// Whatever woke the loop up.
enum Wake {
    Line(Option<String>),
    Identity(Option<Option<User>>),
    Interrupt,
}

//=========================================================================================
// Main loop
//=========================================================================================

/// Runs one session until the user quits or input ends.
pub async fn run<R, W>(app: &mut StudyApp, terminal: &mut Terminal<R, W>) -> Result<(), TutorError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    terminal.write(&render::splash()).await?;
    app.start().await;
    terminal.write(&render::screen(app)).await?;

    let mut identity_open = true;
    loop {
        let wake = tokio::select! {
            line = terminal.lines.next_line() => Wake::Line(line?),
            change = app.next_identity_change(), if identity_open => Wake::Identity(change),
            Ok(()) = tokio::signal::ctrl_c() => Wake::Interrupt,
        };

        let flow = match wake {
            Wake::Line(None) => {
                info!("Input closed.");
                Flow::Quit
            }
            Wake::Line(Some(line)) => handle_command(app, terminal, protocol::parse(&line)).await?,
            Wake::Identity(Some(user)) => {
                app.apply_identity(user).await;
                Flow::Redraw
            }
            Wake::Identity(None) => {
                debug!("Identity provider closed its feed.");
                identity_open = false;
                Flow::Continue
            }
            Wake::Interrupt => Flow::Quit,
        };

        match flow {
            Flow::Continue => {}
            Flow::Redraw => terminal.write(&render::screen(app)).await?,
            Flow::Quit => break,
        }
    }

    // An open conversation is archived on the way out.
    app.close_chat().await;
    terminal.write("Goodbye.\n").await?;
    Ok(())
}

async fn handle_command<R, W>(
    app: &mut StudyApp,
    terminal: &mut Terminal<R, W>,
    command: Command,
) -> Result<Flow, TutorError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    match command {
        Command::Quit => return Ok(Flow::Quit),
        Command::Help => {
            terminal
                .write(&render::help(app.router().screen(), app.chat().is_open()))
                .await?;
            return Ok(Flow::Continue);
        }
        Command::Invalid(hint) => {
            terminal.write(&format!("{}\n", hint)).await?;
            return Ok(Flow::Continue);
        }
        _ => {}
    }

    let screen = app.router().screen().clone();
    match screen {
        Screen::Login => login_command(app, terminal, command).await,
        Screen::Main | Screen::History if app.chat().is_open() => {
            chat_command(app, terminal, command).await
        }
        Screen::Main => main_command(app, terminal, command).await,
        Screen::History => history_command(app, terminal, command).await,
        Screen::Splash => Ok(Flow::Continue),
    }
}

//=========================================================================================
// Per-screen handlers
//=========================================================================================

async fn login_command<R, W>(
    app: &mut StudyApp,
    terminal: &mut Terminal<R, W>,
    command: Command,
) -> Result<Flow, TutorError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if let Some(notice) = app.router().login_notice().filter(|n| n.blocking) {
        terminal
            .write(&format!("Sign-in is unavailable: {}\n", notice.message))
            .await?;
        return Ok(Flow::Continue);
    }

    let request = match command {
        Command::Login { email } => {
            let Some(password) = terminal.prompt("Password: ").await? else {
                return Ok(Flow::Quit);
            };
            SignInRequest::Password { email, password }
        }
        Command::SignUp { email, name } => {
            let Some(password) = terminal.prompt("Choose a password: ").await? else {
                return Ok(Flow::Quit);
            };
            SignInRequest::SignUp { name, email, password }
        }
        Command::EmailLink { email, link } => SignInRequest::EmailLink { email, link },
        Command::PhoneOtp { phone, code } => SignInRequest::PhoneOtp { phone, code },
        _ => {
            terminal.write("Please sign in first. Type /help for options.\n").await?;
            return Ok(Flow::Continue);
        }
    };

    app.sign_in(request).await;
    Ok(Flow::Redraw)
}

async fn main_command<R, W>(
    app: &mut StudyApp,
    terminal: &mut Terminal<R, W>,
    command: Command,
) -> Result<Flow, TutorError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    match command {
        Command::Text(line) => {
            if app.router().main_view() != &MainView::Input {
                terminal
                    .write("Type /reset to start a new analysis, or /chat to ask the tutor.\n")
                    .await?;
                return Ok(Flow::Continue);
            }
            let mut content = app.content_text().to_string();
            if !content.is_empty() {
                content.push('\n');
            }
            content.push_str(&line);
            app.set_content_text(content);
            Ok(Flow::Continue)
        }
        Command::Analyze => {
            analyze(app, terminal).await?;
            Ok(Flow::Redraw)
        }
        Command::Reset => {
            app.reset();
            Ok(Flow::Redraw)
        }
        Command::Toggle(index) => match app.toggle_chapter(index) {
            Some(_) => Ok(Flow::Redraw),
            None => {
                terminal.write(&format!("There is no chapter {}.\n", index + 1)).await?;
                Ok(Flow::Continue)
            }
        },
        Command::Export => {
            if let Some(location) = app.export_result().await {
                terminal.write(&format!("Study guide saved to {}\n", location)).await?;
                return Ok(Flow::Continue);
            }
            Ok(Flow::Redraw)
        }
        Command::Ask(passage) => {
            if !app.ask_about(&passage).await {
                terminal
                    .write("Select a longer passage (at least 6 characters) to ask about.\n")
                    .await?;
                return Ok(Flow::Continue);
            }
            terminal.write(&render::chat_opened(app.chat())).await?;
            Ok(Flow::Continue)
        }
        Command::Chat => open_chat(app, terminal).await,
        Command::History => {
            app.show_history();
            Ok(Flow::Redraw)
        }
        Command::Logout => sign_out(app, terminal).await,
        other => unavailable(terminal, &other).await,
    }
}

async fn history_command<R, W>(
    app: &mut StudyApp,
    terminal: &mut Terminal<R, W>,
    command: Command,
) -> Result<Flow, TutorError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    match command {
        Command::Select(index) => {
            let Some(timestamp) = app.history().analyses().get(index).map(|s| s.timestamp) else {
                terminal.write(&format!("There is no item {}.\n", index + 1)).await?;
                return Ok(Flow::Continue);
            };
            app.select_history_item(timestamp);
            Ok(Flow::Redraw)
        }
        Command::Delete(index) => {
            let Some(timestamp) = app.history().analyses().get(index).map(|s| s.timestamp) else {
                terminal.write(&format!("There is no item {}.\n", index + 1)).await?;
                return Ok(Flow::Continue);
            };
            app.delete_history_item(timestamp).await;
            Ok(Flow::Redraw)
        }
        Command::Clear => {
            app.clear_history().await;
            Ok(Flow::Redraw)
        }
        Command::Chats => {
            terminal.write(&render::chat_list(&app.history().chats())).await?;
            Ok(Flow::Continue)
        }
        Command::ViewChat(index) => {
            let chats = app.history().chats();
            let Some(session) = chats.get(index) else {
                terminal.write(&format!("There is no chat {}.\n", index + 1)).await?;
                return Ok(Flow::Continue);
            };
            terminal.write(&render::chat_transcript(index + 1, session)).await?;
            Ok(Flow::Continue)
        }
        Command::DeleteChat(index) => {
            let Some(timestamp) = app.history().chats().get(index).map(|s| s.timestamp) else {
                terminal.write(&format!("There is no chat {}.\n", index + 1)).await?;
                return Ok(Flow::Continue);
            };
            app.delete_chat_session(timestamp).await;
            terminal.write(&render::chat_list(&app.history().chats())).await?;
            Ok(Flow::Continue)
        }
        Command::Back | Command::Reset => {
            app.show_main();
            Ok(Flow::Redraw)
        }
        Command::Chat => open_chat(app, terminal).await,
        Command::Logout => sign_out(app, terminal).await,
        other => unavailable(terminal, &other).await,
    }
}

/// While the chat is open, free text goes to the tutor.
async fn chat_command<R, W>(
    app: &mut StudyApp,
    terminal: &mut Terminal<R, W>,
    command: Command,
) -> Result<Flow, TutorError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    match command {
        Command::Text(line) => {
            // An empty line sends a question prepared by /ask.
            if !line.trim().is_empty() {
                app.chat_mut().set_input(line);
            }
            stream_reply(app, terminal).await?;
            Ok(Flow::Continue)
        }
        Command::Close => {
            app.close_chat().await;
            terminal.write("Chat closed.\n").await?;
            Ok(Flow::Redraw)
        }
        Command::Ask(passage) => {
            if app.ask_about(&passage).await {
                terminal
                    .write(&format!("Your question: {}\n", app.chat().input()))
                    .await?;
            }
            Ok(Flow::Continue)
        }
        Command::Chat => {
            terminal.write(&render::chat_opened(app.chat())).await?;
            Ok(Flow::Continue)
        }
        other => {
            // Everything else works as usual underneath the panel.
            let screen = app.router().screen().clone();
            match screen {
                Screen::History => history_command(app, terminal, other).await,
                _ => main_command(app, terminal, other).await,
            }
        }
    }
}

//=========================================================================================
// Long-running actions
//=========================================================================================

/// Runs one analysis. Ctrl-C abandons it; a late result is then ignored.
async fn analyze<R, W>(app: &mut StudyApp, terminal: &mut Terminal<R, W>) -> Result<(), TutorError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let Some(ticket) = app.begin_analysis() else {
        return Ok(());
    };
    terminal.write(&render::screen(app)).await?;

    let pipeline = app.pipeline();
    let outcome = tokio::select! {
        outcome = pipeline.analyze(&ticket.content_text) => Some(outcome),
        Ok(()) = tokio::signal::ctrl_c() => None,
    };

    match outcome {
        Some(outcome) => app.complete_analysis(ticket, outcome).await,
        None => {
            info!("Analysis canceled by user.");
            app.reset();
        }
    }
    Ok(())
}

/// Sends the pending chat input and prints the reply as it streams in.
async fn stream_reply<R, W>(app: &mut StudyApp, terminal: &mut Terminal<R, W>) -> Result<(), TutorError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if !app.chat_mut().submit().await {
        return Ok(());
    }
    if !app.chat().is_streaming() {
        // The request never started; the engine already recorded the apology.
        terminal.write(&format!("Professor AI: {}\n", ERROR_REPLY)).await?;
        return Ok(());
    }

    terminal.write("Professor AI: ").await?;
    loop {
        let event = tokio::select! {
            event = app.chat_mut().next_event() => Some(event),
            Ok(()) = tokio::signal::ctrl_c() => None,
        };
        match event {
            Some(StreamEvent::Chunk(text)) => terminal.write(&text).await?,
            Some(StreamEvent::Finished) | Some(StreamEvent::Idle) => {
                terminal.write("\n").await?;
                return Ok(());
            }
            Some(StreamEvent::Failed) => {
                terminal.write(&format!("\n{}\n", ERROR_REPLY)).await?;
                return Ok(());
            }
            None => {
                app.close_chat().await;
                terminal.write("\nChat closed.\n").await?;
                return Ok(());
            }
        }
    }
}

async fn open_chat<R, W>(app: &mut StudyApp, terminal: &mut Terminal<R, W>) -> Result<Flow, TutorError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    app.open_chat().await;
    terminal.write(&render::chat_opened(app.chat())).await?;
    Ok(Flow::Continue)
}

async fn sign_out<R, W>(app: &mut StudyApp, terminal: &mut Terminal<R, W>) -> Result<Flow, TutorError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if !app.allows_sign_out() {
        terminal.write("Guest mode has no sign-out.\n").await?;
        return Ok(Flow::Continue);
    }
    app.sign_out().await;
    Ok(Flow::Redraw)
}

async fn unavailable<R, W>(terminal: &mut Terminal<R, W>, command: &Command) -> Result<Flow, TutorError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    debug!("Command not available here: {:?}", command);
    terminal
        .write("That command is not available here. Type /help for options.\n")
        .await?;
    Ok(Flow::Continue)
}
