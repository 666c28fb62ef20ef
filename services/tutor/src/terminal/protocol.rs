//! services/tutor/src/terminal/protocol.rs
//!
//! Defines the line protocol between the user at the terminal and the session loop.
//! Lines starting with `/` are commands; anything else is free text.

//=========================================================================================
// Commands Typed BY the User
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Content to analyze on the input view, or a message while the chat is open.
    Text(String),

    // --- Analysis ---
    Analyze,
    Reset,
    /// Expands or collapses a chapter (0-based).
    Toggle(usize),
    Export,

    // --- Chat ---
    Chat,
    /// Opens the chat with a question about a passage of the results.
    Ask(String),
    Close,

    // --- History ---
    History,
    Back,
    Select(usize),
    Delete(usize),
    Clear,
    Chats,
    /// Shows the full transcript of a saved chat.
    ViewChat(usize),
    DeleteChat(usize),

    // --- Identity ---
    Login { email: String },
    SignUp { email: String, name: Option<String> },
    EmailLink { email: String, link: String },
    PhoneOtp { phone: String, code: String },
    Logout,

    Help,
    Quit,
    /// A command that could not be understood, with a usage hint.
    Invalid(String),
}

/// Parses one input line.
pub fn parse(line: &str) -> Command {
    let Some(body) = line.trim().strip_prefix('/') else {
        return Command::Text(line.to_string());
    };

    let mut words = body.split_whitespace();
    let name = words.next().unwrap_or_default().to_lowercase();
    let args: Vec<&str> = words.collect();
    let rest = args.join(" ");

    match (name.as_str(), args.as_slice()) {
        ("analyze" | "go", []) => Command::Analyze,
        ("reset" | "new", []) => Command::Reset,
        ("open" | "toggle", [n]) => index(n, "/open <chapter number>", Command::Toggle),
        ("export" | "download", []) => Command::Export,

        ("chat", []) => Command::Chat,
        ("ask", [_, ..]) => Command::Ask(rest),
        ("close", []) => Command::Close,

        ("history", []) => Command::History,
        ("back" | "main", []) => Command::Back,
        ("select", [n]) => index(n, "/select <item number>", Command::Select),
        ("delete", [n]) => index(n, "/delete <item number>", Command::Delete),
        ("clear", []) => Command::Clear,
        ("chats", []) => Command::Chats,
        ("view-chat" | "chat-view", [n]) => index(n, "/view-chat <chat number>", Command::ViewChat),
        ("delete-chat", [n]) => index(n, "/delete-chat <chat number>", Command::DeleteChat),

        ("login", [email]) => Command::Login { email: email.to_string() },
        ("signup", [email, name @ ..]) => Command::SignUp {
            email: email.to_string(),
            name: (!name.is_empty()).then(|| name.join(" ")),
        },
        ("link", [email, link]) => Command::EmailLink {
            email: email.to_string(),
            link: link.to_string(),
        },
        ("otp", [phone, code]) => Command::PhoneOtp {
            phone: phone.to_string(),
            code: code.to_string(),
        },
        ("logout", []) => Command::Logout,

        ("help" | "?", _) => Command::Help,
        ("quit" | "exit", []) => Command::Quit,
        _ => Command::Invalid(format!("Unknown command '/{}'. Type /help for the list.", body.trim())),
    }
}

// Numbers on screen start at 1.
fn index(raw: &str, usage: &str, build: fn(usize) -> Command) -> Command {
    match raw.parse::<usize>() {
        Ok(n) if n > 0 => build(n - 1),
        _ => Command::Invalid(format!("Usage: {}", usage)),
    }
}
