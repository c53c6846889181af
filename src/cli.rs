//! CLI utilities for driving a rover by hand.
use std::{
    io::{BufRead, Write},
    sync::{
        Arc, Weak,
        atomic::{AtomicUsize, Ordering},
    },
};

use crate::{
    command::{Command, CommandError},
    engine::Rover,
    protocol::{TcpTransport, Transport},
};

/// Prompt the operator for a command.
///
/// End of input is treated as [`Command::Exit`].
pub fn prompt<R, W>(mut reader: R, mut writer: W) -> Result<Command, CommandError>
where
    R: BufRead,
    W: Write,
{
    let mut s = String::default();
    write!(&mut writer, "rover> ").map_err(|e| CommandError::Io(e.to_string()))?;
    writer.flush().map_err(|e| CommandError::Io(e.to_string()))?;

    let read = reader
        .read_line(&mut s)
        .map_err(|e| CommandError::Io(e.to_string()))?;
    if read == 0 {
        return Ok(Command::Exit);
    }

    s.as_str().try_into()
}

/// Ctrl-C handling for an interactive session.
///
/// The first interrupt closes the link, which releases whatever the prompt is
/// waiting on. Any further interrupt asks the caller to exit. Only a weak
/// handle is kept, so the session still owns the [`Rover`] and shuts it down.
pub struct Interrupt<T: Transport + 'static = TcpTransport> {
    rover: Weak<Rover<T>>,
    hits: AtomicUsize,
}

impl<T: Transport + 'static> Interrupt<T> {
    pub fn new(rover: &Arc<Rover<T>>) -> Self {
        Self {
            rover: Arc::downgrade(rover),
            hits: AtomicUsize::new(0),
        }
    }

    /// Record an interrupt. Returns `true` when the caller should exit now.
    pub fn hit(&self) -> bool {
        if self.hits.fetch_add(1, Ordering::SeqCst) > 0 {
            return true;
        }

        if let Some(rover) = self.rover.upgrade() {
            rover.close();
        }
        false
    }

    pub fn interrupted(&self) -> bool {
        self.hits.load(Ordering::SeqCst) > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::EngineConfig, engine::Status, protocol::mock::MockTransport};

    #[test]
    fn prompt_prints_correctly() {
        let input = b".exit\n";
        let mut output = Vec::new();

        prompt(&input[..], &mut output).unwrap();

        let output = String::from_utf8(output).expect("not valid UTF-8");
        assert_eq!("rover> ", output);
    }

    #[test]
    fn prompt_handles_commands() {
        let input = b"move 25\n";
        let mut output = Vec::new();

        let res = prompt(&input[..], &mut output).unwrap();
        assert_eq!(Command::Forward(25), res);
    }

    #[test]
    fn prompt_end_of_input_exits() {
        let mut output = Vec::new();

        let res = prompt(&b""[..], &mut output).unwrap();
        assert_eq!(Command::Exit, res);
    }

    #[test]
    #[should_panic(expected = "unrecognized command '.something_wrong'")]
    fn prompt_unrecognized_command() {
        let input = b".something_wrong\n";
        let mut output = Vec::new();

        prompt(&input[..], &mut output).map_err(|e| e.to_string()).unwrap();
    }

    #[test]
    fn first_interrupt_closes_second_exits() {
        let transport = MockTransport::default();
        let rover = Arc::new(Rover::spawn(transport.clone(), EngineConfig::default()).unwrap());
        let interrupt = Interrupt::new(&rover);

        assert!(!interrupt.interrupted());
        assert!(!interrupt.hit());
        assert!(interrupt.interrupted());

        assert_eq!(rover.get_status(), Status::NotConnected);
        assert_eq!(transport.closes(), 1);
        assert_eq!(transport.connects(), 1);

        assert!(interrupt.hit());
        assert_eq!(transport.closes(), 1);
    }

    #[test]
    fn interrupt_does_not_keep_rover_alive() {
        let rover = Rover::spawn(MockTransport::default(), EngineConfig::default()).unwrap();
        let rover = Arc::new(rover);
        let interrupt = Interrupt::new(&rover);

        let Ok(rover) = Arc::try_unwrap(rover) else {
            panic!("interrupt holds a strong reference");
        };
        rover.shutdown();

        assert!(!interrupt.hit());
        assert!(interrupt.hit());
    }
}
