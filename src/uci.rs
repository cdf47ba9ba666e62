//! UCI text front-end. Parses commands from stdin and serializes all
//! engine output through a printer thread so `info` lines from the
//! search worker never interleave with command responses.

use std::io::{self, BufRead};
use std::sync::mpsc;

use log::warn;

use crate::engine::Engine;
use crate::search::SearchLimits;

const ENGINE_NAME: &str = "Stonewall 0.9";
const ENGINE_AUTHOR: &str = "the Stonewall authors";

pub struct UciHandler {
    engine: Engine,
    tx: mpsc::Sender<String>,
}

impl Default for UciHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl UciHandler {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel::<String>();
        std::thread::spawn(move || {
            while let Ok(line) = rx.recv() {
                println!("{line}");
            }
        });
        Self {
            engine: Engine::new(),
            tx,
        }
    }

    pub fn run(&mut self) {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(command) = line else { break };
            let command = command.trim();
            if command.is_empty() {
                continue;
            }
            if !self.handle_command(command) {
                break;
            }
        }
    }

    /// Handles one command; returns false on `quit`.
    fn handle_command(&mut self, command: &str) -> bool {
        let parts: Vec<&str> = command.split_whitespace().collect();
        match parts.first().copied() {
            Some("uci") => {
                self.send(format!("id name {ENGINE_NAME}"));
                self.send(format!("id author {ENGINE_AUTHOR}"));
                self.send("option name Hash type spin default 64 min 1 max 4096".to_string());
                self.send("option name Threads type spin default 1 min 1 max 128".to_string());
                self.send("option name BookPath type string default ".to_string());
                self.send("option name SyzygyPath type string default ".to_string());
                self.send("uciok".to_string());
            }
            Some("isready") => self.send("readyok".to_string()),
            Some("ucinewgame") => self.engine.new_game(),
            Some("position") => self.handle_position(&parts[1..]),
            Some("go") => self.handle_go(&parts[1..]),
            Some("stop") => self.engine.stop(),
            Some("setoption") => self.handle_setoption(&parts[1..]),
            Some("eval") => self.send(self.engine.analysis()),
            Some("quit") => {
                self.engine.stop();
                return false;
            }
            _ => {}
        }
        true
    }

    fn handle_position(&mut self, parts: &[&str]) {
        let mut index = 0;
        let fen_string;
        let fen = match parts.first().copied() {
            Some("startpos") => {
                index = 1;
                None
            }
            Some("fen") => {
                index = 1;
                let mut fields = Vec::new();
                while index < parts.len() && parts[index] != "moves" {
                    fields.push(parts[index]);
                    index += 1;
                }
                fen_string = fields.join(" ");
                Some(fen_string.as_str())
            }
            _ => None,
        };

        let move_tokens: &[&str] = if parts.get(index).copied() == Some("moves") {
            &parts[index + 1..]
        } else {
            &[]
        };

        if let Err(err) = self.engine.set_position(fen, move_tokens) {
            warn!("position rejected: {err:#}");
        }
    }

    fn handle_go(&mut self, parts: &[&str]) {
        let mut limits = SearchLimits::default();
        let mut iter = parts.iter();
        while let Some(&token) = iter.next() {
            match token {
                "depth" => limits.depth = next_number(iter.next()),
                "movetime" => limits.movetime = next_number(iter.next()),
                "wtime" => limits.wtime = next_number(iter.next()),
                "btime" => limits.btime = next_number(iter.next()),
                "winc" => limits.winc = next_number(iter.next()),
                "binc" => limits.binc = next_number(iter.next()),
                "infinite" => limits.infinite = true,
                _ => {}
            }
        }
        self.engine.go(limits, self.tx.clone());
    }

    fn handle_setoption(&mut self, parts: &[&str]) {
        if parts.first().copied() != Some("name") {
            return;
        }
        let Some(value_index) = parts.iter().position(|&p| p == "value") else {
            return;
        };
        if value_index + 1 >= parts.len() {
            return;
        }

        let name = parts[1..value_index].join(" ").to_lowercase();
        let value = parts[value_index + 1..].join(" ");

        match name.as_str() {
            "hash" => {
                if let Ok(mb) = value.parse::<usize>() {
                    self.engine.set_hash_size(mb);
                }
            }
            "threads" => {
                if let Ok(threads) = value.parse::<usize>() {
                    self.engine.set_threads(threads);
                }
            }
            "bookpath" => self.engine.set_book_path(&value),
            "syzygypath" => self.engine.set_tablebases(&value),
            _ => warn!("unknown option {name:?}"),
        }
    }

    fn send(&self, line: String) {
        let _ = self.tx.send(line);
    }
}

fn next_number<T: std::str::FromStr + Default>(token: Option<&&str>) -> T {
    token.and_then(|token| token.parse().ok()).unwrap_or_default()
}
