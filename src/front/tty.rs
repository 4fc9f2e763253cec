//! Terminal front end - a line-oriented quiz loop on stdin.
//!
//! One command per line: draw a question, reveal its answer, quit.
//! Drawing tolerates an empty pool by waiting a few seconds before
//! telling the player to retry.

use crate::models::{Card, Result, TriviumError};
use crate::source::CardSupply;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::error;

/// How long `next` waits when the pool has nothing ready yet.
const EMPTY_POOL_WAIT: Duration = Duration::from_secs(3);

#[derive(Default)]
struct Session {
    current: Option<Card>,
    revealed: bool,
}

enum Outcome {
    Continue,
    Quit,
}

/// Run the interactive loop until `quit` or EOF.
pub async fn run(supply: CardSupply) -> Result<()> {
    supply.start().await;
    print_help();

    let mut session = Session::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        prompt()?;
        let line = lines
            .next_line()
            .await
            .map_err(|e| TriviumError::io("reading stdin", e))?;
        let Some(line) = line else {
            println!();
            supply.stop();
            return Ok(());
        };

        let cmd = line.trim().to_lowercase();
        if let Outcome::Quit = handle_command(&supply, &mut session, &cmd).await {
            return Ok(());
        }
    }
}

async fn handle_command(supply: &CardSupply, session: &mut Session, cmd: &str) -> Outcome {
    match cmd {
        "q" | "quit" | "exit" => {
            supply.stop();
            return Outcome::Quit;
        }
        "h" | "help" | "?" | "" => print_help(),
        "n" | "next" => match supply.draw(EMPTY_POOL_WAIT).await {
            Ok(card) => {
                println!();
                println!("Question:");
                println!("{}", card.question());
                println!();
                session.current = Some(card);
                session.revealed = false;
            }
            Err(TriviumError::Timeout(_)) | Err(TriviumError::EmptyPool) => {
                println!("The question pool is refilling in the background - try again in a moment.");
            }
            Err(err) => {
                error!(error = %err, "Drawing a card failed");
                println!("Could not produce a valid card. Try again.");
            }
        },
        "a" | "answer" => match (&session.current, session.revealed) {
            (None, _) => println!("No active question. Use 'next'."),
            (Some(card), false) => {
                println!("Answer:");
                println!("{}", card.answer_text());
                println!("Explanation:");
                println!("{}", card.explanation());
                println!();
                session.revealed = true;
            }
            (Some(_), true) => {
                println!("The answer was already shown. Use 'next' for a new question.");
            }
        },
        _ => println!("Unknown command. Use 'help'."),
    }
    Outcome::Continue
}

fn print_help() {
    println!("Commands:");
    println!("  n / next     - new question");
    println!("  a / answer   - show the answer to the current question");
    println!("  h / help     - this help");
    println!("  q / quit     - quit");
}

fn prompt() -> Result<()> {
    use std::io::Write;
    print!("> ");
    std::io::stdout()
        .flush()
        .map_err(|e| TriviumError::io("flushing stdout", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::CsvDeck;

    fn deck_supply() -> CardSupply {
        let cards = vec![
            Card::new("How many strings does a cello have?", 4.0, "Four strings.").unwrap(),
            Card::new("How many planets orbit the Sun?", 8.0, "Since 2006.").unwrap(),
        ];
        CardSupply::Deck(CsvDeck::new(cards).unwrap())
    }

    #[tokio::test]
    async fn test_next_sets_current_and_hides_answer() {
        let supply = deck_supply();
        let mut session = Session::default();

        assert!(matches!(
            handle_command(&supply, &mut session, "n").await,
            Outcome::Continue
        ));
        assert!(session.current.is_some());
        assert!(!session.revealed);
    }

    #[tokio::test]
    async fn test_answer_reveals_once() {
        let supply = deck_supply();
        let mut session = Session::default();

        // no question yet
        handle_command(&supply, &mut session, "a").await;
        assert!(!session.revealed);

        handle_command(&supply, &mut session, "next").await;
        handle_command(&supply, &mut session, "answer").await;
        assert!(session.revealed);

        // a second reveal is a no-op
        handle_command(&supply, &mut session, "a").await;
        assert!(session.revealed);
    }

    #[tokio::test]
    async fn test_next_resets_reveal_flag() {
        let supply = deck_supply();
        let mut session = Session::default();

        handle_command(&supply, &mut session, "n").await;
        handle_command(&supply, &mut session, "a").await;
        assert!(session.revealed);

        handle_command(&supply, &mut session, "n").await;
        assert!(!session.revealed);
    }

    #[tokio::test]
    async fn test_quit_stops_the_loop() {
        let supply = deck_supply();
        let mut session = Session::default();

        assert!(matches!(
            handle_command(&supply, &mut session, "quit").await,
            Outcome::Quit
        ));
    }

    #[tokio::test]
    async fn test_unknown_command_keeps_state() {
        let supply = deck_supply();
        let mut session = Session::default();

        handle_command(&supply, &mut session, "n").await;
        let before = session.current.as_ref().map(|c| c.question().to_string());

        assert!(matches!(
            handle_command(&supply, &mut session, "frobnicate").await,
            Outcome::Continue
        ));
        let after = session.current.as_ref().map(|c| c.question().to_string());
        assert_eq!(before, after);
    }
}
