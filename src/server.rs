//! Blocking line-oriented TCP front-end for the engine.
//!
//! An external collaborator, not part of the engine's own contract: it
//! depends only on the four operations in [`crate::store::Store`] and
//! speaks a small newline-delimited text protocol of its own.

use std::io::{self, BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;

use crate::error::EngineError;
use crate::store::Store;

/// Runs a blocking accept loop on `addr`, spawning one thread per
/// connection. Returns only if the listener itself fails to bind.
pub fn run(addr: &str, store: Store) -> io::Result<()> {
    let listener = TcpListener::bind(addr)?;
    log::info!("listening on {addr}");
    for stream in listener.incoming() {
        let stream = stream?;
        let store = store.clone();
        thread::spawn(move || {
            let peer = stream.peer_addr().ok();
            if let Err(err) = handle_client(stream, store) {
                log::warn!("connection {peer:?} ended: {err}");
            } else {
                log::info!("connection {peer:?} closed");
            }
        });
    }
    Ok(())
}

fn handle_client(stream: TcpStream, store: Store) -> io::Result<()> {
    let mut writer = stream.try_clone()?;
    let reader = BufReader::new(stream);

    for line in reader.lines() {
        let line = line?;
        let response = dispatch(&line, &store);
        writer.write_all(response.as_bytes())?;
        writer.flush()?;
    }
    Ok(())
}

/// Parses and executes a single protocol line, returning the
/// newline-terminated response text (never an error: protocol and engine
/// failures are both rendered as `ERR ...\n`, and the connection is kept
/// open regardless).
fn dispatch(line: &str, store: &Store) -> String {
    let mut fields = line.trim_end_matches(['\r', '\n']).split_whitespace();
    let Some(cmd) = fields.next() else {
        return "ERR unknown command\n".to_owned();
    };

    if cmd.eq_ignore_ascii_case("get") {
        let (Some(key), None) = (fields.next(), fields.next()) else {
            return "ERR wrong number of arguments for GET\n".to_owned();
        };
        match store.get(key) {
            Ok(Some(value)) => format!("{value}\n"),
            Ok(None) => "nil\n".to_owned(),
            Err(err) => render_err(&err),
        }
    } else if cmd.eq_ignore_ascii_case("set") {
        let key = fields.next();
        let value = fields.next();
        let ttl_field = fields.next();
        let trailing = fields.next();
        let (Some(key), Some(value), None) = (key, value, trailing) else {
            return "ERR wrong number of arguments for SET\n".to_owned();
        };
        let ttl_millis = match ttl_field {
            Some(raw) => match raw.parse::<i64>() {
                Ok(ttl) => ttl,
                Err(_) => return "ERR invalid TTL value\n".to_owned(),
            },
            None => 0,
        };
        match store.set(key, value, ttl_millis) {
            Ok(()) => "OK\n".to_owned(),
            Err(err) => render_err(&err),
        }
    } else if cmd.eq_ignore_ascii_case("del") {
        let (Some(key), None) = (fields.next(), fields.next()) else {
            return "ERR wrong number of arguments for DEL\n".to_owned();
        };
        match store.del(key) {
            Ok(true) => "OK\n".to_owned(),
            Ok(false) => "nil\n".to_owned(),
            Err(err) => render_err(&err),
        }
    } else {
        "ERR unknown command\n".to_owned()
    }
}

fn render_err(err: &EngineError) -> String {
    format!("ERR {err}\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn temp_store() -> (Store, NamedTempFile) {
        let file = NamedTempFile::new().expect("temp file");
        let store = Store::open(file.path()).unwrap();
        (store, file)
    }

    #[test]
    fn set_then_get() {
        let (store, _file) = temp_store();
        assert_eq!(dispatch("SET foo bar", &store), "OK\n");
        assert_eq!(dispatch("GET foo", &store), "bar\n");
        assert_eq!(dispatch("GET missing", &store), "nil\n");
    }

    #[test]
    fn set_with_bad_ttl_does_not_mutate() {
        let (store, _file) = temp_store();
        assert_eq!(dispatch("SET k v not-a-number", &store), "ERR invalid TTL value\n");
        assert_eq!(dispatch("GET k", &store), "nil\n");
    }

    #[test]
    fn unknown_command() {
        let (store, _file) = temp_store();
        assert_eq!(dispatch("FROB x", &store), "ERR unknown command\n");
    }

    #[test]
    fn arity_mismatches() {
        let (store, _file) = temp_store();
        assert_eq!(dispatch("GET", &store), "ERR wrong number of arguments for GET\n");
        assert_eq!(dispatch("SET onlykey", &store), "ERR wrong number of arguments for SET\n");
        assert_eq!(dispatch("DEL", &store), "ERR wrong number of arguments for DEL\n");
    }

    #[test]
    fn delete_reports_presence() {
        let (store, _file) = temp_store();
        assert_eq!(dispatch("SET k v", &store), "OK\n");
        assert_eq!(dispatch("DEL k", &store), "OK\n");
        assert_eq!(dispatch("DEL k", &store), "nil\n");
    }

    #[test]
    fn commands_are_case_insensitive() {
        let (store, _file) = temp_store();
        assert_eq!(dispatch("SeT k v", &store), "OK\n");
        assert_eq!(dispatch("gEt k", &store), "v\n");
    }
}
