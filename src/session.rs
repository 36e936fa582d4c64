//! Interactive operator session: select, confirm, dispatch, report.

use std::io::Read;

use anyhow::Context;

use crate::console::{Console, ConsoleError};
use crate::menu::{self, Selection};
use crate::{AckResult, Channel, Clock, CommandTable, Dispatcher, Error};

/// Run the menu loop until the operator exits or input ends.
///
/// Transmission failures are reported and the loop continues, any other
/// dispatcher or console failure ends the session.
pub fn run<P, C, E, R>(
    d: &mut Dispatcher<P, C, E>,
    table: &CommandTable,
    console: &mut Console<R>,
) -> anyhow::Result<()>
where
    P: Channel<E>,
    C: Clock,
    E: core::fmt::Debug + Send + Sync + 'static,
    R: Read,
{
    loop {
        print!("{}", menu::render(table));

        let entry = loop {
            let input = match console.prompt("\nEnter the option number: ") {
                Err(ConsoleError::Eof) => return Ok(()),
                r => r.context("reading selection")?,
            };

            match menu::parse_selection(&input, table) {
                Some(Selection::Exit) => return Ok(()),
                Some(Selection::Command(id)) => match table.get(id) {
                    Some(e) => break e,
                    None => continue,
                },
                None => println!("Invalid option, please try again."),
            }
        };

        let confirmed = loop {
            let q = format!("Execute '{}'? (yes/no): ", entry.description);
            let input = match console.prompt(&q) {
                Err(ConsoleError::Eof) => return Ok(()),
                r => r.context("reading confirmation")?,
            };

            match menu::parse_confirmation(&input) {
                Some(v) => break v,
                None => println!("Invalid answer, please reply 'yes' or 'no'."),
            }
        };

        if !confirmed {
            println!("Cancelled.");
            continue;
        }

        println!(
            "Sending '{}', awaiting confirmation ({} ms)...",
            entry.code,
            d.options().ack_timeout_ms
        );

        match d.dispatch(entry) {
            Ok(a) if a.result == AckResult::Acknowledged => {
                println!("Confirmation received for '{}'.", a.code)
            }
            Ok(a) => println!("Timed out: no confirmation received for '{}'.", a.code),
            Err(Error::Transmit(e)) => println!("Error sending command: {:?}", e),
            Err(e) => return Err(anyhow::Error::new(e).context(format!("dispatching {}", entry.code))),
        }
    }
}

/// Whether a session failure was caused by a user interrupt
pub fn is_interrupt<E>(e: &anyhow::Error) -> bool
where
    E: core::fmt::Debug + Send + Sync + 'static,
{
    e.chain().any(|c| {
        matches!(c.downcast_ref::<ConsoleError>(), Some(ConsoleError::Interrupted))
            || matches!(c.downcast_ref::<Error<E>>(), Some(Error::Interrupted))
    })
}

/// Process exit status for a session result, interrupts are a normal exit
pub fn exit_code<E>(r: &anyhow::Result<()>) -> i32
where
    E: core::fmt::Debug + Send + Sync + 'static,
{
    match r {
        Ok(()) => 0,
        Err(e) if is_interrupt::<E>(e) => 0,
        Err(_) => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockChannel, MockClock, MockError};
    use crate::{Cancel, Options};
    use std::sync::atomic::AtomicBool;

    type MockDispatcher = Dispatcher<MockChannel, MockClock, MockError>;

    fn setup(port: impl FnOnce(&mut MockChannel)) -> (MockDispatcher, crate::mock::MockHandle) {
        let clock = MockClock::new();
        let mut ch = MockChannel::new(&clock);
        port(&mut ch);
        let h = ch.handle();
        (Dispatcher::new(ch, clock, Options::default()), h)
    }

    #[test]
    fn confirmed_selection_is_sent() {
        let (mut d, h) = setup(|p| p.reply_after(1000, b"ATL\n"));
        let mut console = Console::new(&b"1\nyes\nexit\n"[..], Cancel::never());

        let r = run(&mut d, &CommandTable::standard(), &mut console);

        assert!(r.is_ok());
        assert_eq!(exit_code::<MockError>(&r), 0);
        assert_eq!(h.written(), b"ATL".to_vec());
    }

    #[test]
    fn declined_and_invalid_input_sends_nothing() {
        let (mut d, h) = setup(|_| ());
        let mut console = Console::new(&b"99\n17\nmaybe\nno\n"[..], Cancel::never());

        let r = run(&mut d, &CommandTable::standard(), &mut console);

        assert!(r.is_ok());
        assert!(h.written().is_empty());
    }

    #[test]
    fn write_failure_keeps_session_alive() {
        let (mut d, h) = setup(|p| p.fail_writes());
        let mut console = Console::new(&b"2\ny\n3\ny\nsair\n"[..], Cancel::never());

        let r = run(&mut d, &CommandTable::standard(), &mut console);

        assert_eq!(exit_code::<MockError>(&r), 0);
        assert_eq!(h.flushes(), 0);
    }

    #[test]
    fn lost_channel_is_a_failure() {
        let (mut d, _) = setup(|p| p.fail_reads_at(0));
        let mut console = Console::new(&b"1\nyes\nexit\n"[..], Cancel::never());

        let r = run(&mut d, &CommandTable::standard(), &mut console);

        let e = r.as_ref().unwrap_err();
        assert!(!is_interrupt::<MockError>(e));
        assert!(matches!(
            e.downcast_ref::<Error<MockError>>(),
            Some(Error::Channel(MockError::ReadFailed))
        ));
        assert_eq!(exit_code::<MockError>(&r), 1);
    }

    #[test]
    fn interrupt_during_wait_exits_cleanly() {
        static FLAG: AtomicBool = AtomicBool::new(false);

        let clock = MockClock::new();
        clock.interrupt_at(1500, &FLAG);
        let ch = MockChannel::new(&clock);
        let h = ch.handle();
        let mut d = Dispatcher::new(ch, clock, Options::default()).with_cancel(Cancel::on(&FLAG));
        let mut console = Console::new(&b"1\nyes\n"[..], Cancel::on(&FLAG));

        let r = run(&mut d, &CommandTable::standard(), &mut console);

        assert!(is_interrupt::<MockError>(r.as_ref().unwrap_err()));
        assert_eq!(exit_code::<MockError>(&r), 0);

        assert!(d.close());
        drop(d);
        assert_eq!(h.closes(), 1);
    }

    #[test]
    fn interrupt_at_prompt_exits_cleanly() {
        static FLAG: AtomicBool = AtomicBool::new(true);

        let (mut d, h) = setup(|_| ());
        let mut console = Console::new(&b"1\nyes\n"[..], Cancel::on(&FLAG));

        let r = run(&mut d, &CommandTable::standard(), &mut console);

        assert_eq!(exit_code::<MockError>(&r), 0);
        assert!(h.written().is_empty());
    }
}
