//! Scripted game service.
//!
//! The server does not run a model. Each request is answered with a fixed
//! event script chosen from the prompt: a game build, a publish run, or an
//! asset batch.

use std::sync::LazyLock;

use regex::Regex;

use crate::session::{
    AssetCompleted, AssetGenerating, AssetSessionComplete, AssetSessionStart, GameCode,
    PublishSuccess, SessionEvent,
};

static WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\w+\b").expect("valid word regex"));

const SITE_STOP_WORDS: [&str; 10] = [
    "game", "create", "make", "a", "an", "the", "with", "and", "or", "but",
];

const PUBLISH_KEYWORDS: [&str; 4] = ["publish", "deploy", "go live", "share my game"];

const ASSET_KEYWORDS: [&str; 3] = ["asset", "sprite", "artwork"];

pub const DEFAULT_SITE_BASE: &str = "maya-game";

/// Which script a prompt triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Create,
    Publish,
    Assets,
}

impl Intent {
    pub fn classify(prompt: &str) -> Self {
        let lower = prompt.to_lowercase();
        if PUBLISH_KEYWORDS.iter().any(|k| lower.contains(k)) {
            Intent::Publish
        } else if ASSET_KEYWORDS.iter().any(|k| lower.contains(k)) {
            Intent::Assets
        } else {
            Intent::Create
        }
    }
}

// =============================================================================
// Game templates
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    Breakout,
    Memory,
}

impl Template {
    pub fn for_prompt(prompt: &str) -> Self {
        if prompt.to_lowercase().contains("breakout") {
            Template::Breakout
        } else {
            Template::Memory
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Template::Breakout => "breakout",
            Template::Memory => "memory",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Template::Breakout => {
                "A neon brick breaker. Move the paddle with the arrow keys and clear the wall!"
            }
            Template::Memory => "A card matching game. Flip two cards at a time and find every pair!",
        }
    }

    /// Self-contained page with styles and script inline.
    pub fn html(self) -> &'static str {
        match self {
            Template::Breakout => BREAKOUT_HTML,
            Template::Memory => MEMORY_HTML,
        }
    }

    pub fn code(self) -> GameCode {
        GameCode {
            html: self.html().to_string(),
            css: String::new(),
            js: String::new(),
        }
    }
}

const BREAKOUT_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<title>Neon Breakout</title>
<style>
  body { margin: 0; min-height: 100vh; display: grid; place-items: center; background: #0b1020; }
  canvas { border: 2px solid #22d3ee; box-shadow: 0 0 24px #22d3ee; }
</style>
</head>
<body>
<canvas id="board" width="640" height="400"></canvas>
<script>
  const c = document.getElementById('board'), g = c.getContext('2d');
  const pad = { x: 270, w: 100 }, ball = { x: 320, y: 220, vx: 3, vy: -3 };
  const bricks = [];
  for (let r = 0; r < 4; r++) for (let k = 0; k < 8; k++) bricks.push({ x: k * 80 + 5, y: r * 26 + 20, on: true });
  const held = {};
  onkeydown = e => held[e.key] = true;
  onkeyup = e => held[e.key] = false;
  (function tick() {
    if (held.ArrowLeft) pad.x = Math.max(0, pad.x - 7);
    if (held.ArrowRight) pad.x = Math.min(c.width - pad.w, pad.x + 7);
    ball.x += ball.vx; ball.y += ball.vy;
    if (ball.x < 6 || ball.x > c.width - 6) ball.vx *= -1;
    if (ball.y < 6) ball.vy *= -1;
    if (ball.y > 372 && ball.x > pad.x && ball.x < pad.x + pad.w) ball.vy = -Math.abs(ball.vy);
    if (ball.y > c.height) Object.assign(ball, { x: 320, y: 220, vy: -3 });
    for (const b of bricks) if (b.on && ball.x > b.x && ball.x < b.x + 70 && ball.y > b.y && ball.y < b.y + 18) { b.on = false; ball.vy *= -1; }
    g.fillStyle = '#0b1020'; g.fillRect(0, 0, c.width, c.height);
    g.fillStyle = '#22d3ee'; g.fillRect(pad.x, 380, pad.w, 10);
    g.fillStyle = '#a78bfa'; g.beginPath(); g.arc(ball.x, ball.y, 6, 0, 7); g.fill();
    g.fillStyle = '#34d399'; for (const b of bricks) if (b.on) g.fillRect(b.x, b.y, 70, 18);
    requestAnimationFrame(tick);
  })();
</script>
</body>
</html>"#;

const MEMORY_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<title>Memory Grid</title>
<style>
  body { margin: 0; min-height: 100vh; display: grid; place-items: center; background: #0b1020; color: #e2e8f0; font-family: sans-serif; }
  #grid { display: grid; grid-template-columns: repeat(4, 72px); gap: 12px; }
  .card { height: 72px; display: grid; place-items: center; font-size: 28px; border: 2px solid #22d3ee; border-radius: 8px; cursor: pointer; }
  .open { background: #7c3aed; } .done { background: #059669; }
</style>
</head>
<body>
<p>Moves: <span id="moves">0</span></p>
<div id="grid"></div>
<script>
  const faces = ['A', 'B', 'C', 'D', 'E', 'F', 'G', 'H'];
  const deck = [...faces, ...faces].sort(() => Math.random() - 0.5);
  let open = [], moves = 0;
  const grid = document.getElementById('grid');
  deck.forEach(face => {
    const el = document.createElement('div');
    el.className = 'card'; el.textContent = '?';
    el.onclick = () => {
      if (open.length === 2 || el.classList.contains('open') || el.classList.contains('done')) return;
      el.classList.add('open'); el.textContent = face; open.push([el, face]);
      if (open.length < 2) return;
      document.getElementById('moves').textContent = ++moves;
      const [[a, fa], [b, fb]] = open;
      setTimeout(() => {
        for (const x of [a, b]) { x.classList.remove('open'); if (fa === fb) x.classList.add('done'); else x.textContent = '?'; }
        open = [];
      }, 700);
    };
    grid.appendChild(el);
  });
</script>
</body>
</html>"#;

// =============================================================================
// Scripts
// =============================================================================

/// Events for building a game from a prompt.
pub fn creation_script(prompt: &str) -> (Template, Vec<SessionEvent>) {
    let template = Template::for_prompt(prompt);
    let key = template.key();

    let mut events = vec![SessionEvent::Status("thinking".into())];
    events.extend(
        [
            "I'll help you build this! Let me look at your request...".to_string(),
            format!("\n\nGood idea. I'm planning a {} game with:", key),
            "\n• Neon visual theme".to_string(),
            "\n• Smooth animation".to_string(),
            "\n• Keyboard and mouse controls".to_string(),
            "\n\nStarting on the code now...".to_string(),
        ]
        .into_iter()
        .map(SessionEvent::Chunk),
    );
    events.push(SessionEvent::Status("generating".into()));
    events.extend(
        [
            "<createFile name='index.html'>Setting up game structure...</createFile>",
            "<generateCSS>Adding styling...</generateCSS>",
            "<implementJS>Writing game logic...</implementJS>",
            "<optimizeCode>Polishing...</optimizeCode>",
        ]
        .into_iter()
        .map(|c| SessionEvent::Command(c.to_string())),
    );
    events.push(SessionEvent::Code(template.code()));
    events.push(SessionEvent::Chunk(format!(
        "\n\nYour {} game is ready! {}\n\nWhat would you like to change next?",
        key,
        template.description()
    )));
    events.push(SessionEvent::Suggestions(
        "• Add a score counter\n• Add sound effects\n• Add a harder level\n• Publish the game"
            .to_string(),
    ));

    (template, events)
}

/// Events for publishing the session's current game.
///
/// Without a game the run stops after validation with `no_game`.
pub fn publish_script(prompt: &str, current_game: Option<&GameCode>) -> Vec<SessionEvent> {
    let mut events = vec![SessionEvent::PublishStatus("validating".into())];

    let has_game = current_game.is_some_and(|game| !game.html.trim().is_empty());
    if !has_game {
        events.push(SessionEvent::PublishError("no_game".into()));
        events.push(SessionEvent::Chunk(
            "I don't see a game to publish yet! What kind of game would you like to build?"
                .to_string(),
        ));
        return events;
    }

    let site_name = generate_site_name(prompt);
    let live_url = format!("https://{}.web.app", site_name);
    events.push(SessionEvent::PublishStatus("preparing".into()));
    events.push(SessionEvent::PublishStatus("deploying".into()));
    events.push(SessionEvent::PublishSuccess(PublishSuccess {
        live_url: live_url.clone(),
        site_name,
        message: "Game published successfully".to_string(),
    }));
    events.push(SessionEvent::Chunk(format!(
        "Your game is live at:\n{}\n\nAnyone with the link can play it.",
        live_url
    )));
    events
}

/// Asset categories generated for an asset request.
pub const ASSET_CATEGORIES: [&str; 3] = ["character", "background", "item"];

pub fn asset_start(prompt: &str, session_id: &str, user_id: &str) -> SessionEvent {
    SessionEvent::AssetSessionStart(AssetSessionStart {
        description: prompt.to_string(),
        total_assets: ASSET_CATEGORIES.len() as u32,
        categories: ASSET_CATEGORIES.iter().map(|c| c.to_string()).collect(),
        session_id: Some(session_id.to_string()),
        user_id: Some(user_id.to_string()),
    })
}

pub fn asset_generating(category: &str) -> SessionEvent {
    SessionEvent::AssetGenerating(AssetGenerating {
        category: category.to_string(),
        status: format!("Generating {}...", category),
    })
}

pub fn asset_completed(
    category: &str,
    filename: &str,
    storage_url: &str,
    size_bytes: u64,
    session_id: &str,
) -> SessionEvent {
    SessionEvent::AssetCompleted(AssetCompleted {
        category: category.to_string(),
        filename: filename.to_string(),
        storage_url: storage_url.to_string(),
        size_bytes,
        session_id: Some(session_id.to_string()),
        created_at: Some(chrono::Utc::now().to_rfc3339()),
    })
}

pub fn asset_complete(generated: u32) -> SessionEvent {
    let requested = ASSET_CATEGORIES.len() as u32;
    SessionEvent::AssetSessionComplete(AssetSessionComplete {
        total_generated: generated,
        total_requested: requested,
        status: if generated == requested {
            "completed".to_string()
        } else {
            "partial".to_string()
        },
        fallback_mode: Some(true),
    })
}

/// Placeholder image written for each scripted asset: a 1x1 PNG.
pub const PLACEHOLDER_PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
    0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0xF8,
    0xCF, 0xC0, 0xF0, 0x1F, 0x00, 0x05, 0x00, 0x01, 0xFF, 0x89, 0x99, 0x3D, 0x1D, 0x00, 0x00,
    0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
];

// =============================================================================
// Site names
// =============================================================================

/// Web-safe site name: up to three meaningful prompt words plus a random
/// four-character suffix, e.g. `space-shooter-a1b2`.
pub fn generate_site_name(prompt: &str) -> String {
    let lower = prompt.to_lowercase();
    let words: Vec<&str> = WORD_RE
        .find_iter(&lower)
        .map(|m| m.as_str())
        .filter(|w| w.chars().count() > 2 && !SITE_STOP_WORDS.contains(w))
        .take(3)
        .collect();

    let base = if words.is_empty() {
        DEFAULT_SITE_BASE.to_string()
    } else {
        words.join("-")
    };
    let suffix = &uuid::Uuid::new_v4().simple().to_string()[..4];

    sanitize_site_name(&format!("{}-{}", base, suffix))
}

fn sanitize_site_name(raw: &str) -> String {
    let kept: String = raw
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-')
        .collect();
    kept.split('-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}
