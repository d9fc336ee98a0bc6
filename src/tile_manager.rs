//! Progressive tiled image assembly.
//!
//! Backends push raw tile updates from their session threads; a fixed pool
//! of post-processing workers initializes each tile (flip remap, opaque
//! alpha), applies the optional color transform and publishes the result to
//! consumers. The newest sample always wins per tile index.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering},
        Arc,
    },
    thread::JoinHandle,
    time::Duration,
};

use parking_lot::{Condvar, Mutex, RwLock};

use crate::{
    color::ColorProcessor,
    image::{ImageBuffer, ImageFormat, FULLY_OPAQUE},
};

/// Sample value marking a tile slot that has never been written.
pub const TILE_SAMPLE_SENTINEL: u16 = u16::MAX;

/// Index value marking an unused tile slot.
pub const TILE_INDEX_SENTINEL: u16 = u16::MAX;

const WORKER_POOL_SIZE: usize = 10;
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(100);

bitflags::bitflags! {
    pub struct TileFlags: u8 {
        /// Pixel data is 16-bit float instead of 32-bit float.
        const HDR_DATA = 0b01;
        /// Flip remap and alpha fill already ran for this tile.
        const INITIALIZED = 0b10;
    }
}

/// One rectangular region of the output image at a given sample count.
#[derive(Clone, Debug)]
pub struct TileData {
    pub x: u16,
    pub y: u16,
    pub w: u16,
    pub h: u16,
    /// Highest sample number folded into this tile.
    pub sample: u16,
    pub index: u16,
    pub flags: TileFlags,
    pub data: Vec<u8>,
}

impl Default for TileData {
    fn default() -> Self {
        TileData {
            x: 0,
            y: 0,
            w: 0,
            h: 0,
            sample: TILE_SAMPLE_SENTINEL,
            index: TILE_INDEX_SENTINEL,
            flags: TileFlags::empty(),
            data: Vec::new(),
        }
    }
}

impl TileData {
    pub fn is_hdr_data(&self) -> bool {
        self.flags.contains(TileFlags::HDR_DATA)
    }

    pub fn is_float_data(&self) -> bool {
        !self.is_hdr_data()
    }

    fn pixel_format(&self) -> ImageFormat {
        if self.is_hdr_data() {
            ImageFormat::Rgba16F
        } else {
            ImageFormat::Rgba32F
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
enum State {
    Initial = 0,
    Running,
    Cancelled,
    Stopped,
}

struct TileConfig {
    width: u32,
    height: u32,
    tile_width: u32,
    tile_height: u32,
    cpu_device: bool,
    exposure: f32,
    gamma: f32,
    flip_horizontally: bool,
    flip_vertically: bool,
    use_float_data: bool,
    /// Minimum folded sample count for a tile to count as rendered.
    sample_threshold: u32,
    color_processor: Option<Arc<dyn ColorProcessor>>,
}

impl Default for TileConfig {
    fn default() -> Self {
        TileConfig {
            width: 0,
            height: 0,
            tile_width: 0,
            tile_height: 0,
            cpu_device: false,
            exposure: 1.0,
            gamma: 1.0,
            flip_horizontally: false,
            flip_vertically: false,
            use_float_data: true,
            sample_threshold: 1,
            color_processor: None,
        }
    }
}

struct InputTiles {
    tiles: Vec<TileData>,
    queue: VecDeque<usize>,
}

struct Shared {
    config: RwLock<TileConfig>,
    num_tiles: AtomicU32,

    state: AtomicU8,
    has_pending_work: AtomicBool,
    wait_mutex: Mutex<()>,
    wait_condition: Condvar,

    input: Mutex<InputTiles>,
    completed: Mutex<Vec<TileData>>,
    rendered: Mutex<Vec<TileData>>,

    rendered_sample_count_per_tile: RwLock<Vec<AtomicU32>>,
    num_tiles_with_rendered_samples: AtomicU32,

    progressive_image: Mutex<ImageBuffer>,
}

impl Shared {
    fn state(&self) -> State {
        match self.state.load(Ordering::Acquire) {
            0 => State::Initial,
            1 => State::Running,
            2 => State::Cancelled,
            _ => State::Stopped,
        }
    }

    fn set_state(&self, state: State) {
        self.state.store(state as u8, Ordering::Release);
        self.wait_condition.notify_all();
    }

    fn notify_pending_work(&self) {
        self.has_pending_work.store(true, Ordering::Release);
        self.wait_condition.notify_all();
    }

    /// Flip remap into final image coordinates, in-place pixel flip and
    /// opaque alpha. Runs once per tile.
    fn initialize_tile_data(&self, tile: &mut TileData) {
        if tile.flags.contains(TileFlags::INITIALIZED) {
            return;
        }
        tile.flags |= TileFlags::INITIALIZED;
        let (flip_h, flip_v, width, height) = {
            let config = self.config.read();
            (
                config.flip_horizontally,
                config.flip_vertically,
                config.width,
                config.height,
            )
        };
        if flip_h {
            tile.x = (width - tile.x as u32 - tile.w as u32) as u16;
        }
        if flip_v {
            tile.y = (height - tile.y as u32 - tile.h as u32) as u16;
        }
        let bytes = std::mem::take(&mut tile.data);
        match ImageBuffer::from_bytes(tile.w as u32, tile.h as u32, ImageFormat::Rgba32F, bytes) {
            Ok(mut img) => {
                img.flip(flip_h, flip_v);
                img.clear_alpha(FULLY_OPAQUE);
                tile.data = img.into_bytes();
            }
            Err(err) => {
                tracing::error!("Dropping malformed tile {}: {err}", tile.index);
            }
        }
    }

    fn apply_post_processing(&self, tile: &mut TileData) {
        let processor = self.config.read().color_processor.clone();
        let processor = match processor {
            Some(p) => p,
            None => return,
        };
        let bytes = std::mem::take(&mut tile.data);
        match ImageBuffer::from_bytes(tile.w as u32, tile.h as u32, tile.pixel_format(), bytes) {
            Ok(mut img) => {
                if let Err(err) = processor.apply(&mut img) {
                    tracing::error!("Unable to apply color transform: {err}");
                }
                tile.data = img.into_bytes();
            }
            Err(err) => {
                tracing::error!("Skipping color transform for tile {}: {err}", tile.index);
            }
        }
    }

    fn worker_loop(&self) {
        loop {
            while self.has_pending_work.load(Ordering::Acquire) {
                let tile = {
                    let mut input = self.input.lock();
                    if self.state() == State::Cancelled {
                        return;
                    }
                    match input.queue.pop_front() {
                        None => {
                            self.has_pending_work.store(false, Ordering::Release);
                            break;
                        }
                        Some(index) => {
                            if input.queue.is_empty() {
                                self.has_pending_work.store(false, Ordering::Release);
                            }
                            input.tiles[index].clone()
                        }
                    }
                };
                if self.state() == State::Cancelled {
                    return;
                }

                let mut tile = tile;
                self.initialize_tile_data(&mut tile);

                if self.state() == State::Cancelled {
                    return;
                }

                {
                    // Completed tiles keep float data without color
                    // correction; correction is applied after denoising.
                    let mut completed = self.completed.lock();
                    let index = tile.index as usize;
                    if index < completed.len()
                        && (completed[index].sample == TILE_SAMPLE_SENTINEL
                            || tile.sample >= completed[index].sample)
                    {
                        completed[index] = tile.clone();
                    }
                }

                self.apply_post_processing(&mut tile);

                {
                    let mut rendered = self.rendered.lock();
                    if self.state() == State::Cancelled {
                        return;
                    }
                    let index = tile.index as usize;
                    let sample = tile.sample as u32;
                    rendered.push(tile);

                    let threshold = self.config.read().sample_threshold;
                    let counts = self.rendered_sample_count_per_tile.read();
                    if let Some(count) = counts.get(index) {
                        let current = count.load(Ordering::Acquire);
                        if sample + 1 >= threshold {
                            count.store(sample + 1, Ordering::Release);
                            if current == 0 {
                                self.num_tiles_with_rendered_samples
                                    .fetch_add(1, Ordering::AcqRel);
                            }
                        }
                    }
                }
            }

            if !self.has_pending_work.load(Ordering::Acquire) {
                let mut guard = self.wait_mutex.lock();
                let _ = self
                    .wait_condition
                    .wait_for(&mut guard, IDLE_POLL_INTERVAL);
            }
            let state = self.state();
            if state == State::Cancelled
                || (state == State::Stopped && !self.has_pending_work.load(Ordering::Acquire))
            {
                return;
            }
        }
    }
}

/// Multi-producer/multi-consumer tiled progressive compositor.
pub struct TileManager {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for TileManager {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt.debug_struct("TileManager")
            .field("tiles", &self.tile_count())
            .field("state", &self.shared.state.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for TileManager {
    fn default() -> Self {
        TileManager::new()
    }
}

impl TileManager {
    pub fn new() -> Self {
        TileManager {
            shared: Arc::new(Shared {
                config: RwLock::new(TileConfig::default()),
                num_tiles: AtomicU32::new(0),
                state: AtomicU8::new(State::Initial as u8),
                has_pending_work: AtomicBool::new(false),
                wait_mutex: Mutex::new(()),
                wait_condition: Condvar::new(),
                input: Mutex::new(InputTiles {
                    tiles: Vec::new(),
                    queue: VecDeque::new(),
                }),
                completed: Mutex::new(Vec::new()),
                rendered: Mutex::new(Vec::new()),
                rendered_sample_count_per_tile: RwLock::new(Vec::new()),
                num_tiles_with_rendered_samples: AtomicU32::new(0),
                progressive_image: Mutex::new(ImageBuffer::new(0, 0, ImageFormat::Rgba32F)),
            }),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Sets up tiling for an image and launches the worker pool.
    pub fn initialize(
        &self,
        width: u32,
        height: u32,
        tile_width: u32,
        tile_height: u32,
        cpu_device: bool,
        exposure: f32,
        gamma: f32,
        color_processor: Option<Arc<dyn ColorProcessor>>,
    ) {
        let tiles_x = width / tile_width + u32::from(width % tile_width > 0);
        let tiles_y = height / tile_height + u32::from(height % tile_height > 0);
        let num_tiles = tiles_x * tiles_y;
        {
            let mut config = self.shared.config.write();
            config.width = width;
            config.height = height;
            config.tile_width = tile_width;
            config.tile_height = tile_height;
            config.cpu_device = cpu_device;
            config.exposure = exposure;
            config.gamma = gamma;
            config.color_processor = color_processor;
        }
        self.shared.num_tiles.store(num_tiles, Ordering::Release);
        {
            let mut input = self.shared.input.lock();
            input.tiles = vec![TileData::default(); num_tiles as usize];
            input.queue.clear();
        }
        *self.shared.completed.lock() = vec![TileData::default(); num_tiles as usize];
        *self.shared.progressive_image.lock() =
            ImageBuffer::new(width, height, ImageFormat::Rgba32F);
        self.reload(false);
    }

    pub fn tile_size(&self) -> (u32, u32) {
        let config = self.shared.config.read();
        (config.tile_width, config.tile_height)
    }

    pub fn tile_count(&self) -> u32 {
        self.shared.num_tiles.load(Ordering::Acquire)
    }

    pub fn set_exposure(&self, exposure: f32) {
        self.shared.config.write().exposure = exposure;
    }

    pub fn set_gamma(&self, gamma: f32) {
        self.shared.config.write().gamma = gamma;
    }

    pub fn set_use_float_data(&self, use_float_data: bool) {
        self.shared.config.write().use_float_data = use_float_data;
    }

    pub fn set_flip_image(&self, horizontally: bool, vertically: bool) {
        let mut config = self.shared.config.write();
        config.flip_horizontally = horizontally;
        config.flip_vertically = vertically;
    }

    /// Producer entry point: folds a backend tile update into the input set.
    /// A stale sample (lower than what is stored) is discarded.
    pub fn update_render_tile(&self, tile: TileData) {
        let index = tile.index as usize;
        let mut input = self.shared.input.lock();
        let slot = match input.tiles.get(index) {
            Some(slot) => slot,
            None => {
                tracing::warn!("Tile index {index} out of range, ignoring update");
                return;
            }
        };
        if slot.sample != TILE_SAMPLE_SENTINEL && tile.sample <= slot.sample {
            return;
        }
        input.tiles[index] = tile;
        input.queue.push_back(index);
        drop(input);
        self.shared.notify_pending_work();
    }

    /// Alias used by backends that distinguish read and write callbacks.
    pub fn write_render_tile(&self, tile: TileData) {
        self.update_render_tile(tile);
    }

    /// Publishes a fully post-processed tile directly to consumers. Meant
    /// for single-tile outputs that bypass the worker pool.
    pub fn add_rendered_tile(&self, tile: TileData) {
        let mut rendered = self.shared.rendered.lock();
        self.shared
            .num_tiles_with_rendered_samples
            .store(self.tile_count(), Ordering::Release);
        rendered.push(tile);
    }

    /// Blits every completed tile into the progressive image and returns it.
    /// Stops the worker pool first.
    pub fn update_final_image(&self) -> ImageBuffer {
        self.stop_and_wait();
        let completed = self.shared.completed.lock();
        let mut image = self.shared.progressive_image.lock();
        for tile in completed.iter() {
            if tile.index == TILE_INDEX_SENTINEL {
                continue;
            }
            match ImageBuffer::from_bytes(
                tile.w as u32,
                tile.h as u32,
                ImageFormat::Rgba32F,
                tile.data.clone(),
            ) {
                Ok(src) => {
                    if let Err(err) = image.blit_from(&src, tile.x as u32, tile.y as u32) {
                        tracing::error!("Tile {} does not fit the image: {err}", tile.index);
                    }
                }
                Err(err) => {
                    tracing::error!("Completed tile {} is malformed: {err}", tile.index);
                }
            }
        }
        image.clone()
    }

    /// Drains the batch of tiles rendered since the last call.
    pub fn rendered_tile_batch(&self) -> Vec<TileData> {
        std::mem::take(&mut *self.shared.rendered.lock())
    }

    pub fn current_tile_sample_count(&self, tile_index: u32) -> u32 {
        let counts = self.shared.rendered_sample_count_per_tile.read();
        counts
            .get(tile_index as usize)
            .map(|c| c.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    pub fn tiles_with_rendered_samples_count(&self) -> u32 {
        self.shared
            .num_tiles_with_rendered_samples
            .load(Ordering::Acquire)
    }

    pub fn all_tiles_have_rendered_samples(&self) -> bool {
        self.tiles_with_rendered_samples_count() == self.tile_count()
    }

    /// Resets all per-tile state and relaunches the worker pool. With
    /// `wait_for_completion` the current queue drains first; otherwise
    /// in-flight work is cancelled.
    pub fn reload(&self, wait_for_completion: bool) {
        if wait_for_completion {
            self.stop_and_wait();
        } else {
            self.shared.set_state(State::Cancelled);
        }
        self.shared.has_pending_work.store(false, Ordering::Release);

        let num_tiles = self.tile_count() as usize;
        {
            let mut rendered = self.shared.rendered.lock();
            rendered.clear();
            self.shared
                .num_tiles_with_rendered_samples
                .store(0, Ordering::Release);
            let mut counts = self.shared.rendered_sample_count_per_tile.write();
            *counts = (0..num_tiles).map(|_| AtomicU32::new(0)).collect();
        }
        {
            let mut completed = self.shared.completed.lock();
            for tile in completed.iter_mut() {
                tile.sample = TILE_SAMPLE_SENTINEL;
            }
        }
        {
            let mut input = self.shared.input.lock();
            for tile in input.tiles.iter_mut() {
                tile.sample = TILE_SAMPLE_SENTINEL;
            }
            input.queue.clear();
        }

        self.wait();
        self.shared.set_state(State::Running);
        let mut workers = self.workers.lock();
        for _ in 0..WORKER_POOL_SIZE {
            let shared = self.shared.clone();
            workers.push(std::thread::spawn(move || shared.worker_loop()));
        }
    }

    /// Cooperative cancellation: workers exit at the next poll point.
    pub fn cancel(&self) {
        self.shared.set_state(State::Cancelled);
    }

    /// Joins all workers of the current pool.
    pub fn wait(&self) {
        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            let _ = worker.join();
        }
    }

    /// Lets workers drain remaining work, then joins them.
    pub fn stop_and_wait(&self) {
        self.shared.set_state(State::Stopped);
        self.wait();
    }
}

impl Drop for TileManager {
    fn drop(&mut self) {
        self.stop_and_wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tile(index: u16, x: u16, y: u16, size: u16, sample: u16, value: f32) -> TileData {
        let pixels = vec![[value, value, value, 0.5f32]; size as usize * size as usize];
        TileData {
            x,
            y,
            w: size,
            h: size,
            sample,
            index,
            flags: TileFlags::empty(),
            data: bytemuck::cast_slice(&pixels).to_vec(),
        }
    }

    fn drain(manager: &TileManager, expected: usize) -> Vec<TileData> {
        let mut batch = Vec::new();
        for _ in 0..200 {
            batch.extend(manager.rendered_tile_batch());
            if batch.len() >= expected {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        batch
    }

    #[test]
    fn tiles_are_processed_and_published() {
        let manager = TileManager::new();
        manager.initialize(128, 128, 64, 64, true, 1.0, 1.0, None);
        assert_eq!(manager.tile_count(), 4);

        for i in 0..4u16 {
            let x = (i % 2) * 64;
            let y = (i / 2) * 64;
            manager.update_render_tile(tile(i, x, y, 64, 0, i as f32));
        }
        let batch = drain(&manager, 4);
        assert_eq!(batch.len(), 4);
        assert!(batch.iter().all(|t| t.flags.contains(TileFlags::INITIALIZED)));
        assert_eq!(manager.tiles_with_rendered_samples_count(), 4);
        assert!(manager.all_tiles_have_rendered_samples());
    }

    #[test]
    fn progressive_batches_accumulate() {
        let manager = TileManager::new();
        manager.initialize(256, 256, 64, 64, true, 1.0, 1.0, None);
        assert_eq!(manager.tile_count(), 16);

        for i in 0..16u16 {
            let x = (i % 4) * 64;
            let y = (i / 4) * 64;
            manager.update_render_tile(tile(i, x, y, 64, 0, 0.25));
        }
        let first = drain(&manager, 16);
        assert_eq!(first.len(), 16);

        for i in 0..16u16 {
            let x = (i % 4) * 64;
            let y = (i / 4) * 64;
            manager.update_render_tile(tile(i, x, y, 64, 1, 0.5));
        }
        let second = drain(&manager, 16);
        assert_eq!(second.len(), 16);

        manager.stop_and_wait();
        let completed = manager.shared.completed.lock();
        assert!(completed.iter().all(|t| t.sample == 1));
    }

    #[test]
    fn stale_sample_does_not_overwrite() {
        let manager = TileManager::new();
        manager.initialize(64, 64, 64, 64, true, 1.0, 1.0, None);
        manager.update_render_tile(tile(0, 0, 0, 64, 5, 1.0));
        drain(&manager, 1);

        manager.update_render_tile(tile(0, 0, 0, 64, 2, 0.0));
        std::thread::sleep(Duration::from_millis(50));
        let input = manager.shared.input.lock();
        assert_eq!(input.tiles[0].sample, 5);
    }

    #[test]
    fn final_image_contains_tile_pixels() {
        let manager = TileManager::new();
        manager.initialize(128, 64, 64, 64, true, 1.0, 1.0, None);
        manager.update_render_tile(tile(0, 0, 0, 64, 0, 0.25));
        manager.update_render_tile(tile(1, 64, 0, 64, 0, 0.75));
        drain(&manager, 2);

        let image = manager.update_final_image();
        let px = image.pixels_f32().unwrap();
        let left = (32 * 128 + 16) * 4;
        let right = (32 * 128 + 64 + 16) * 4;
        assert_eq!(px[left], 0.25);
        assert_eq!(px[right], 0.75);
        // Initialization replaced the alpha channel.
        assert_eq!(px[left + 3], 1.0);
    }

    #[test]
    fn cancellation_is_prompt() {
        let manager = TileManager::new();
        manager.initialize(64, 64, 64, 64, true, 1.0, 1.0, None);
        manager.cancel();
        let start = std::time::Instant::now();
        manager.wait();
        assert!(start.elapsed() < Duration::from_secs(2));
        // No worker picks up tiles pushed after cancellation.
        manager.update_render_tile(tile(0, 0, 0, 64, 0, 1.0));
        std::thread::sleep(Duration::from_millis(50));
        assert!(manager.rendered_tile_batch().is_empty());
    }

    #[test]
    fn reload_resets_counters() {
        let manager = TileManager::new();
        manager.initialize(64, 64, 64, 64, true, 1.0, 1.0, None);
        manager.update_render_tile(tile(0, 0, 0, 64, 3, 0.5));
        drain(&manager, 1);
        assert_eq!(manager.tiles_with_rendered_samples_count(), 1);

        manager.reload(true);
        assert_eq!(manager.tiles_with_rendered_samples_count(), 0);
        assert_eq!(manager.current_tile_sample_count(0), 0);
        assert!(manager.rendered_tile_batch().is_empty());

        // The relaunched pool accepts new work.
        manager.update_render_tile(tile(0, 0, 0, 64, 0, 0.5));
        assert_eq!(drain(&manager, 1).len(), 1);
    }

    #[test]
    fn flipped_tiles_are_remapped() {
        let manager = TileManager::new();
        manager.initialize(128, 128, 64, 64, true, 1.0, 1.0, None);
        manager.set_flip_image(true, true);
        manager.update_render_tile(tile(0, 0, 0, 64, 0, 1.0));
        let batch = drain(&manager, 1);
        assert_eq!(batch[0].x, 64);
        assert_eq!(batch[0].y, 64);
    }
}
