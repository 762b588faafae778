//! GTK4 + layer-shell indicator that runs on the **main thread**.
//!
//! # Widget tree
//!
//! ```text
//! window                     (layer-shell, transparent, anchored to a corner)
//! └ .kanata-indicator        (dark rounded box)
//!     └ .kanata-layer        (GtkLabel with the layer name)
//! ```
//!
//! The user stylesheet may restyle both classes; see [`DEFAULT_CSS`] for the
//! built-in look.

use crate::config::{Corner, IndicatorConfig};
use crate::coordinator::ReconnectCoordinator;
use crate::event::Event;
use crate::traits::{Indicator, Lifecycle, ServiceBus};
use gtk4::prelude::*;
use gtk4::{gdk, glib};
use gtk4_layer_shell::{Edge, LayerShell};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

/// How often the main loop drains the event channel.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub const DEFAULT_CSS: &str = r#"
window,
window.background {
    background-color: transparent;
    background: none;
}

.kanata-indicator {
    background-color: rgba(0, 0, 0, 0.75);
    border-radius: 8px;
    padding: 4px 10px;
}

.kanata-layer {
    color: rgba(255, 255, 255, 0.95);
    font-weight: bold;
}
"#;

/// A layer-shell window holding one label.
pub struct GtkIndicator {
    window: gtk4::Window,
    label: gtk4::Label,
}

impl GtkIndicator {
    /// Build the (hidden) window.  GTK must already be initialised.
    pub fn new(config: &IndicatorConfig) -> Self {
        let window = gtk4::Window::new();
        window.init_layer_shell();
        window.set_layer(gtk4_layer_shell::Layer::Top);
        window.set_namespace("kanata-indicator");
        window.set_keyboard_mode(gtk4_layer_shell::KeyboardMode::None);
        window.set_decorated(false);
        window.remove_css_class("background");

        let (vertical, horizontal) = match config.corner {
            Corner::TopLeft => (Edge::Top, Edge::Left),
            Corner::TopRight => (Edge::Top, Edge::Right),
            Corner::BottomLeft => (Edge::Bottom, Edge::Left),
            Corner::BottomRight => (Edge::Bottom, Edge::Right),
        };
        for edge in [vertical, horizontal] {
            window.set_anchor(edge, true);
            window.set_margin(edge, config.margin);
        }

        let container = gtk4::Box::new(gtk4::Orientation::Horizontal, 0);
        container.add_css_class("kanata-indicator");

        let label = gtk4::Label::new(Some(config.initial_text.as_str()));
        label.add_css_class("kanata-layer");
        label.set_valign(gtk4::Align::Center);
        container.append(&label);
        window.set_child(Some(&container));
        window.set_visible(false);

        Self { window, label }
    }
}

impl Indicator for GtkIndicator {
    fn set_layer(&mut self, text: &str) {
        self.label.set_text(text);
    }

    fn set_visible(&mut self, visible: bool) {
        if self.window.is_visible() == visible {
            return;
        }
        if visible {
            self.window.present();
        } else {
            self.window.set_visible(false);
        }
    }

    fn destroy(&mut self) {
        self.window.destroy();
    }
}

//  Public API

/// Run the GTK4 main loop on the **current** (main) thread.
///
/// `make_coordinator` receives the indicator once GTK is up.  The loop ends
/// when the coordinator handles [`Event::Shutdown`] or every sender of
/// `events_rx` is gone.
pub fn run_main_loop<B: ServiceBus>(
    make_coordinator: impl FnOnce(GtkIndicator) -> ReconnectCoordinator<GtkIndicator, B>,
    events_rx: mpsc::Receiver<Event>,
    css_path: Option<PathBuf>,
    config: &IndicatorConfig,
) -> Result<(), glib::BoolError> {
    gtk4::init()?;
    info!("GTK4 initialised on main thread");

    load_css(css_path.as_deref());

    let mut coordinator = make_coordinator(GtkIndicator::new(config));
    coordinator.start();

    let main_loop = glib::MainLoop::new(None, false);
    let quit = main_loop.clone();

    glib::timeout_add_local(POLL_INTERVAL, move || loop {
        match events_rx.try_recv() {
            Ok(event) => {
                debug!("event: {:?}", event);
                if coordinator.handle(event).is_break() {
                    coordinator.indicator_mut().destroy();
                    quit.quit();
                    return glib::ControlFlow::Break;
                }
            }
            Err(mpsc::TryRecvError::Empty) => return glib::ControlFlow::Continue,
            Err(mpsc::TryRecvError::Disconnected) => {
                info!("event channel closed, exiting");
                coordinator.stop();
                coordinator.indicator_mut().destroy();
                quit.quit();
                return glib::ControlFlow::Break;
            }
        }
    });

    info!("entering GLib main loop");
    main_loop.run();
    info!("GLib main loop exited");
    Ok(())
}

//  CSS loading

fn load_css(css_path: Option<&Path>) {
    let provider = gtk4::CssProvider::new();
    #[allow(deprecated)]
    provider.load_from_data(&super::stylesheet(css_path, DEFAULT_CSS));

    match gdk::Display::default() {
        Some(display) => gtk4::style_context_add_provider_for_display(
            &display,
            &provider,
            gtk4::STYLE_PROVIDER_PRIORITY_APPLICATION,
        ),
        None => warn!("no GDK display, CSS will not be applied"),
    }
}
