//! Wayland layer-shell integration

use crate::config::OverlayConfig;
use crate::geometry::{BADGE_HEIGHT, BADGE_WIDTH, BOTTOM_MARGIN, WINDOW_ALPHA, WorkArea};
use crate::render;
use crate::state::SharedState;
use crate::ui::thread::{MessageLoop, Platform};
use crate::ui::{Action, ActionSink, Driver, OverlayWindow, Target};
use anyhow::{Context, Result, anyhow};
use calloop::EventLoop;
use calloop::channel::{self, Event, Sender};
use smithay_client_toolkit::{
    compositor::{CompositorHandler, CompositorState, Region},
    delegate_compositor, delegate_layer, delegate_output, delegate_registry, delegate_shm,
    output::{OutputHandler, OutputState},
    reexports::calloop_wayland_source::WaylandSource,
    registry::{ProvidesRegistryState, RegistryState},
    registry_handlers,
    shell::{
        WaylandSurface,
        wlr_layer::{
            Anchor, KeyboardInteractivity, Layer, LayerShell, LayerShellHandler, LayerSurface,
            LayerSurfaceConfigure,
        },
    },
    shm::{
        Shm, ShmHandler,
        slot::{Buffer, SlotPool},
    },
};
use tiny_skia::Pixmap;
use tracing::{debug, error, warn};
use wayland_client::{
    Connection, QueueHandle,
    globals::registry_queue_init,
    protocol::{wl_output, wl_shm, wl_surface},
};

const STRIDE: u32 = BADGE_WIDTH * 4;

/// Layer-shell backend on its own calloop loop
pub struct Wayland;

pub struct WaylandSink(Sender<Action>);

impl ActionSink for WaylandSink {
    fn submit(&self, action: Action) -> bool {
        self.0.send(action).is_ok()
    }
}

pub struct WaylandLoop {
    conn: Connection,
    event_loop: EventLoop<'static, WaylandApp>,
    app: WaylandApp,
}

impl Platform for Wayland {
    type Sink = WaylandSink;
    type Loop = WaylandLoop;

    fn open(&self, config: &OverlayConfig, state: SharedState) -> Result<(WaylandSink, WaylandLoop)> {
        let conn = Connection::connect_to_env().context("failed to connect to Wayland display")?;
        let (globals, mut event_queue) =
            registry_queue_init::<WaylandApp>(&conn).context("failed to read Wayland globals")?;
        let qh = event_queue.handle();

        let mut app = WaylandApp::new(&globals, &qh, config, state)?;

        // The initial commit is answered with a configure; wait for it so the
        // surface is ready to map on the first show
        event_queue
            .roundtrip(&mut app)
            .context("Wayland roundtrip failed")?;
        debug!(configured = app.window.configured, "layer surface created");

        let event_loop: EventLoop<'static, WaylandApp> =
            EventLoop::try_new().context("failed to create event loop")?;

        WaylandSource::new(conn.clone(), event_queue)
            .insert(event_loop.handle())
            .map_err(|e| anyhow!("failed to register Wayland source: {}", e.error))?;

        let (sender, actions) = channel::channel::<Action>();
        event_loop
            .handle()
            .insert_source(actions, |event, _, app| match event {
                Event::Msg(action) => app.apply(action),
                Event::Closed => app.exit = true,
            })
            .map_err(|e| anyhow!("failed to register action channel: {}", e.error))?;

        Ok((
            WaylandSink(sender),
            WaylandLoop {
                conn,
                event_loop,
                app,
            },
        ))
    }
}

impl MessageLoop for WaylandLoop {
    fn run(mut self) {
        while !self.app.exit {
            if let Err(e) = self.event_loop.dispatch(None, &mut self.app) {
                error!("Wayland event loop failed: {}", e);
                break;
            }
        }

        self.app.window.destroy();
        if let Err(e) = self.conn.flush() {
            debug!("failed to flush Wayland connection on exit: {}", e);
        }
    }
}

/// Loop data: sctk state, the layer surface and the action driver
pub struct WaylandApp {
    registry_state: RegistryState,
    _compositor_state: CompositorState,
    _layer_shell: LayerShell,
    window: LayerWindow,
    driver: Driver,
    exit: bool,
}

impl WaylandApp {
    fn new(
        globals: &wayland_client::globals::GlobalList,
        qh: &QueueHandle<Self>,
        config: &OverlayConfig,
        state: SharedState,
    ) -> Result<Self> {
        let registry_state = RegistryState::new(globals);
        let outputs = OutputState::new(globals, qh);
        let compositor_state =
            CompositorState::bind(globals, qh).context("wl_compositor not available")?;
        let shm = Shm::bind(globals, qh).context("wl_shm not available")?;
        let layer_shell =
            LayerShell::bind(globals, qh).context("compositor lacks wlr-layer-shell")?;
        let pool = SlotPool::new((STRIDE * BADGE_HEIGHT) as usize, &shm)
            .context("failed to create shm pool")?;

        let surface = compositor_state.create_surface(qh);
        let layer = layer_shell.create_layer_surface(
            qh,
            surface,
            Layer::Overlay,
            Some(config.namespace.clone()),
            None, // compositor picks the output
        );

        layer.set_size(BADGE_WIDTH, BADGE_HEIGHT);
        layer.set_anchor(Anchor::BOTTOM);
        layer.set_margin(0, 0, BOTTOM_MARGIN, 0);
        layer.set_keyboard_interactivity(KeyboardInteractivity::None);
        // Stay inside the area other panels reserve, reserve nothing ourselves
        layer.set_exclusive_zone(0);

        // Empty input region: pointer events fall through to what is below
        let region = Region::new(&compositor_state).context("failed to create input region")?;
        layer.wl_surface().set_input_region(Some(region.wl_region()));

        layer.commit();

        Ok(Self {
            registry_state,
            _compositor_state: compositor_state,
            _layer_shell: layer_shell,
            window: LayerWindow {
                outputs,
                shm,
                pool,
                layer: Some(layer),
                buffer: None,
                frame: None,
                configured: false,
                awaiting_configure: true,
                mapped: false,
                want_visible: false,
            },
            driver: Driver::new(state, config),
            exit: false,
        })
    }

    fn apply(&mut self, action: Action) {
        if self.driver.apply(&mut self.window, action).is_break() {
            self.exit = true;
        }
    }
}

/// Layer surface plus the buffers backing it
struct LayerWindow {
    outputs: OutputState,
    shm: Shm,
    pool: SlotPool,
    layer: Option<LayerSurface>,
    buffer: Option<Buffer>,
    // Latest frame, BGRA with window opacity applied
    frame: Option<Vec<u8>>,
    configured: bool,
    awaiting_configure: bool,
    mapped: bool,
    want_visible: bool,
}

impl LayerWindow {
    fn apply_target(&self, target: Option<Target>) {
        let Some(layer) = &self.layer else {
            return;
        };

        match target {
            Some(target) => {
                layer.set_anchor(Anchor::BOTTOM | Anchor::LEFT);
                layer.set_margin(
                    0,
                    0,
                    target.placement.bottom_margin(&target.area),
                    target.placement.left_margin(&target.area),
                );
            }
            None => {
                // Bottom-only anchor centers horizontally
                layer.set_anchor(Anchor::BOTTOM);
                layer.set_margin(0, 0, BOTTOM_MARGIN, 0);
            }
        }
    }

    /// Attach the latest frame and commit, mapping the surface
    fn attach_frame(&mut self) -> Result<()> {
        let (Some(layer), Some(frame)) = (&self.layer, &self.frame) else {
            return Ok(());
        };

        let (buffer, canvas) = self
            .pool
            .create_buffer(
                BADGE_WIDTH as i32,
                BADGE_HEIGHT as i32,
                STRIDE as i32,
                wl_shm::Format::Argb8888,
            )
            .context("failed to allocate shm buffer")?;

        let len = canvas.len().min(frame.len());
        canvas[..len].copy_from_slice(&frame[..len]);

        let surface = layer.wl_surface();
        buffer
            .attach_to(surface)
            .map_err(|e| anyhow!("failed to attach buffer: {:?}", e))?;
        surface.damage_buffer(0, 0, BADGE_WIDTH as i32, BADGE_HEIGHT as i32);
        surface.commit();

        self.buffer = Some(buffer);
        self.mapped = true;
        Ok(())
    }

    fn request_configure(&mut self) {
        let Some(layer) = &self.layer else {
            return;
        };
        if !self.awaiting_configure {
            // Committing without a buffer restarts the configure sequence
            layer.commit();
            self.awaiting_configure = true;
        }
    }

    fn on_configure(&mut self) {
        self.configured = true;
        self.awaiting_configure = false;

        if self.want_visible && !self.mapped {
            if let Err(e) = self.attach_frame() {
                warn!("failed to map badge after configure: {e:#}");
            }
        }
    }
}

impl OverlayWindow for LayerWindow {
    fn work_area(&self) -> Option<WorkArea> {
        self.outputs.outputs().find_map(|output| {
            let info = self.outputs.info(&output)?;
            let (x, y) = info.logical_position?;
            let (width, height) = info.logical_size?;
            Some(WorkArea::new(x, y, width, height))
        })
    }

    fn present(&mut self, frame: &Pixmap, target: Option<Target>) -> Result<()> {
        let mut bytes = vec![0; (STRIDE * BADGE_HEIGHT) as usize];
        render::write_bgra(frame, &mut bytes, WINDOW_ALPHA);
        self.frame = Some(bytes);

        if self.mapped {
            self.apply_target(target);
            self.attach_frame()?;
        }
        Ok(())
    }

    fn show(&mut self, target: Option<Target>) -> Result<()> {
        self.want_visible = true;
        self.apply_target(target);

        if self.configured {
            self.attach_frame()
        } else {
            self.request_configure();
            Ok(())
        }
    }

    fn hide(&mut self) {
        self.want_visible = false;
        if !self.mapped {
            return;
        }

        if let Some(layer) = &self.layer {
            // A null buffer unmaps; the next map needs a fresh configure
            let surface = layer.wl_surface();
            surface.attach(None, 0, 0);
            surface.commit();
        }
        self.buffer = None;
        self.mapped = false;
        self.configured = false;
    }

    fn destroy(&mut self) {
        self.buffer = None;
        self.layer = None;
        self.mapped = false;
        self.configured = false;
        self.want_visible = false;
    }
}

delegate_compositor!(WaylandApp);
delegate_output!(WaylandApp);
delegate_shm!(WaylandApp);
delegate_layer!(WaylandApp);
delegate_registry!(WaylandApp);

impl CompositorHandler for WaylandApp {
    fn scale_factor_changed(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _new_factor: i32,
    ) {
    }

    fn transform_changed(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _new_transform: wl_output::Transform,
    ) {
    }

    fn frame(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _time: u32,
    ) {
    }

    fn surface_enter(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _output: &wl_output::WlOutput,
    ) {
    }

    fn surface_leave(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _output: &wl_output::WlOutput,
    ) {
    }
}

impl OutputHandler for WaylandApp {
    fn output_state(&mut self) -> &mut OutputState {
        &mut self.window.outputs
    }

    fn new_output(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _output: wl_output::WlOutput,
    ) {
    }

    fn update_output(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _output: wl_output::WlOutput,
    ) {
    }

    fn output_destroyed(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _output: wl_output::WlOutput,
    ) {
    }
}

impl LayerShellHandler for WaylandApp {
    fn closed(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, _layer: &LayerSurface) {
        warn!("compositor closed the overlay surface");
        self.window.destroy();
        self.exit = true;
    }

    fn configure(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _layer: &LayerSurface,
        configure: LayerSurfaceConfigure,
        _serial: u32,
    ) {
        debug!(size = ?configure.new_size, "layer surface configured");
        self.window.on_configure();
    }
}

impl ShmHandler for WaylandApp {
    fn shm_state(&mut self) -> &mut Shm {
        &mut self.window.shm
    }
}

impl ProvidesRegistryState for WaylandApp {
    fn registry(&mut self) -> &mut RegistryState {
        &mut self.registry_state
    }
    registry_handlers![OutputState];
}
