use std::io::{self, Stdout};
use std::time::{Duration, Instant};

use anyhow::Result;
use crossbeam_channel::Receiver;
use crossterm::event::{self, Event, KeyEventKind};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use tracing::{debug, info};

use crate::controller::Controller;
use crate::tasks::Delivery;

/// Drives the controller from terminal events and background deliveries.
pub struct Model {
    controller: Controller,
    deliveries: Receiver<Delivery>,
    needs_redraw: bool,
}

impl Model {
    pub fn new(controller: Controller, deliveries: Receiver<Delivery>) -> Self {
        Self {
            controller,
            deliveries,
            needs_redraw: true,
        }
    }

    pub fn run(&mut self) -> Result<()> {
        let mut stdout = io::stdout();
        enable_raw_mode()?;
        stdout.execute(EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        let size = terminal.size()?;
        self.controller.resize(size.width, size.height);
        self.controller.start();

        let result = self.event_loop(&mut terminal);

        disable_raw_mode()?;
        terminal.backend_mut().execute(LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let mut last_tick = Instant::now();
        let tick_rate = Duration::from_secs(1);

        loop {
            if self.poll_async() {
                self.needs_redraw = true;
            }

            if self.needs_redraw {
                let controller = &self.controller;
                terminal.draw(|frame| {
                    let area = frame.size();
                    if let Some((x, y)) = controller.draw(frame.buffer_mut(), area) {
                        frame.set_cursor(x, y);
                    }
                })?;
                self.needs_redraw = false;
            }

            let timeout = tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_millis(16))
                // Deliveries are drained between polls.
                .min(Duration::from_millis(50));

            if event::poll(timeout)? {
                match event::read()? {
                    Event::Key(key) if key.kind == KeyEventKind::Press => {
                        if self.controller.handle_key(key) {
                            info!("quit requested");
                            return Ok(());
                        }
                        self.needs_redraw = true;
                    }
                    Event::Resize(width, height) => {
                        debug!(width, height, "terminal resized");
                        self.controller.resize(width, height);
                        self.needs_redraw = true;
                    }
                    _ => {}
                }
            }

            if self.poll_async() {
                self.needs_redraw = true;
            }

            if last_tick.elapsed() >= tick_rate {
                last_tick = Instant::now();
                self.controller.tick();
                // Relative ages move on even when nothing else happens.
                self.needs_redraw = true;
            }
        }
    }

    fn poll_async(&mut self) -> bool {
        let mut changed = false;
        while let Ok(delivery) = self.deliveries.try_recv() {
            self.controller.apply(delivery);
            changed = true;
        }
        changed
    }
}
