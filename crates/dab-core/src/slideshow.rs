//! Slideshow images and the bounded cache that holds them.
//!
//! MOT entities arrive from a data decoder; the JPEG and PNG ones become
//! [`Slideshow`] entries in a [`NotificationCache`]. The cache keeps the most
//! recent entries and tells subscribers about every entry it drops, so a
//! renderer can release its copy in time.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

use crate::config::SlideshowConfig;
use crate::observer::{Observable, SubscriptionId};

/// MOT content type of images.
pub const MOT_CONTENT_TYPE_IMAGE: u8 = 2;
/// Image content subtype of JFIF (JPEG).
pub const MOT_IMAGE_JFIF: u16 = 1;
/// Image content subtype of PNG.
pub const MOT_IMAGE_PNG: u16 = 3;

struct CacheInner<T> {
    /// Most recent first.
    entries: VecDeque<Arc<T>>,
    capacity: usize,
}

/// Bounded list of the most recently inserted items.
///
/// Evictions happen oldest first, and every evicted item is announced to
/// the eviction subscribers before it is removed. Subscribers run with the
/// cache locked and must not call back into it.
pub struct NotificationCache<T> {
    inner: Mutex<CacheInner<T>>,
    on_evict: Observable<dyn Fn(&T) + Send + Sync>,
}

impl<T> NotificationCache<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: VecDeque::with_capacity(capacity),
                capacity,
            }),
            on_evict: Observable::new(),
        }
    }

    /// Add `item` as the most recent entry, evicting the oldest ones if the
    /// cache overflows.
    pub fn insert(&self, item: T) -> Arc<T> {
        let item = Arc::new(item);
        let mut inner = self.lock();
        inner.entries.push_front(item.clone());
        self.evict_excess(&mut inner);
        item
    }

    /// Change the capacity. Shrinking evicts immediately.
    pub fn set_capacity(&self, capacity: usize) {
        let mut inner = self.lock();
        inner.capacity = capacity;
        self.evict_excess(&mut inner);
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn newest(&self) -> Option<Arc<T>> {
        self.lock().entries.front().cloned()
    }

    pub fn oldest(&self) -> Option<Arc<T>> {
        self.lock().entries.back().cloned()
    }

    /// All entries, most recent first.
    pub fn snapshot(&self) -> Vec<Arc<T>> {
        self.lock().entries.iter().cloned().collect()
    }

    /// Evict everything.
    pub fn clear(&self) {
        let mut inner = self.lock();
        while let Some(oldest) = inner.entries.back().cloned() {
            self.on_evict.notify(|f| f(oldest.as_ref()));
            inner.entries.pop_back();
        }
    }

    pub fn on_evict(&self, callback: Box<dyn Fn(&T) + Send + Sync>) -> SubscriptionId {
        self.on_evict.attach(callback)
    }

    pub fn detach(&self, id: SubscriptionId) -> bool {
        self.on_evict.detach(id)
    }

    fn evict_excess(&self, inner: &mut CacheInner<T>) {
        while inner.entries.len() > inner.capacity {
            if let Some(oldest) = inner.entries.back() {
                self.on_evict.notify(|f| f(oldest.as_ref()));
            }
            inner.entries.pop_back();
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner<T>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<T> std::fmt::Debug for NotificationCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("NotificationCache")
            .field("len", &inner.entries.len())
            .field("capacity", &inner.capacity)
            .finish()
    }
}

/// Image format of a slide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ImageType {
    Jpeg,
    Png,
}

/// UTC time from a MOT header parameter (expire or trigger time).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MotTime {
    pub year: u16,
    /// 1..=12
    pub month: u8,
    /// 1..=31
    pub day: u8,
    pub hours: u8,
    pub minutes: u8,
    pub seconds: u8,
}

impl MotTime {
    /// Seconds since the Unix epoch, `None` for an out-of-range date.
    pub fn unix_timestamp(&self) -> Option<i64> {
        if !(1..=12).contains(&self.month)
            || !(1..=31).contains(&self.day)
            || self.hours > 23
            || self.minutes > 59
            || self.seconds > 59
        {
            return None;
        }
        // Civil date to day count, years starting in March
        let (y, m) = if self.month <= 2 {
            (self.year as i64 - 1, self.month as i64 + 9)
        } else {
            (self.year as i64, self.month as i64 - 3)
        };
        let era = y.div_euclid(400);
        let yoe = y - era * 400;
        let doy = (153 * m + 2) / 5 + self.day as i64 - 1;
        let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
        let days = era * 146_097 + doe - 719_468;
        Some(
            days * 86_400
                + self.hours as i64 * 3600
                + self.minutes as i64 * 60
                + self.seconds as i64,
        )
    }
}

/// A reassembled MOT object as handed over by the data decoder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MotEntity {
    pub transport_id: u16,
    pub content_type: u8,
    pub content_sub_type: u16,
    pub content_name: Option<String>,
    /// Character set of `content_name` (EN 101 756 table 1)
    pub content_name_charset: u8,
    pub expire_time: Option<MotTime>,
    pub trigger_time: Option<MotTime>,
    /// Slideshow header extension: category and slide within it
    pub category: Option<(u8, u8)>,
    pub category_title: Option<String>,
    pub click_through_url: Option<String>,
    pub alt_location_url: Option<String>,
    pub emergency_alert: bool,
    pub body: Vec<u8>,
}

/// One slideshow image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Slideshow {
    pub transport_id: u16,
    pub image_type: ImageType,
    pub name: Option<String>,
    /// Set together with `name`
    pub name_charset: Option<u8>,
    pub expire_time: Option<MotTime>,
    pub trigger_time: Option<MotTime>,
    pub category_id: Option<u8>,
    pub slide_id: Option<u8>,
    pub category_title: Option<String>,
    pub click_through_url: Option<String>,
    pub alt_location_url: Option<String>,
    pub is_emergency_alert: bool,
    #[serde(skip)]
    pub data: Vec<u8>,
}

impl Slideshow {
    /// Build a slide from a MOT entity, `None` if it is not an image this
    /// receiver can show.
    pub fn from_entity(entity: MotEntity) -> Option<Self> {
        if entity.content_type != MOT_CONTENT_TYPE_IMAGE {
            return None;
        }
        let image_type = match entity.content_sub_type {
            MOT_IMAGE_JFIF => ImageType::Jpeg,
            MOT_IMAGE_PNG => ImageType::Png,
            _ => return None,
        };
        Some(Self {
            transport_id: entity.transport_id,
            image_type,
            name_charset: entity.content_name.as_ref().map(|_| entity.content_name_charset),
            name: entity.content_name,
            expire_time: entity.expire_time,
            trigger_time: entity.trigger_time,
            category_id: entity.category.map(|(c, _)| c),
            slide_id: entity.category.map(|(_, s)| s),
            category_title: entity.category_title,
            click_through_url: entity.click_through_url,
            alt_location_url: entity.alt_location_url,
            is_emergency_alert: entity.emergency_alert,
            data: entity.body,
        })
    }
}

/// Turns MOT entities into cached slides.
#[derive(Debug)]
pub struct SlideshowManager {
    cache: NotificationCache<Slideshow>,
    on_new: Observable<dyn Fn(&Slideshow) + Send + Sync>,
}

impl SlideshowManager {
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: NotificationCache::new(capacity),
            on_new: Observable::new(),
        }
    }

    pub fn from_config(config: &SlideshowConfig) -> Self {
        Self::new(config.capacity)
    }

    /// Store the entity if it is a slide. Returns the stored slide.
    pub fn process_entity(&self, entity: MotEntity) -> Option<Arc<Slideshow>> {
        let transport_id = entity.transport_id;
        let Some(slide) = Slideshow::from_entity(entity) else {
            tracing::debug!(transport_id, "MOT entity is not a slideshow image");
            return None;
        };
        let slide = self.cache.insert(slide);
        tracing::info!(
            transport_id,
            name = slide.name.as_deref().unwrap_or(""),
            bytes = slide.data.len(),
            "slideshow added"
        );
        self.on_new.notify(|f| f(slide.as_ref()));
        Some(slide)
    }

    pub fn on_new_slideshow(&self, callback: Box<dyn Fn(&Slideshow) + Send + Sync>) -> SubscriptionId {
        self.on_new.attach(callback)
    }

    pub fn on_slideshow_removed(&self, callback: Box<dyn Fn(&Slideshow) + Send + Sync>) -> SubscriptionId {
        self.cache.on_evict(callback)
    }

    pub fn set_capacity(&self, capacity: usize) {
        self.cache.set_capacity(capacity);
    }

    /// Cached slides, most recent first.
    pub fn slideshows(&self) -> Vec<Arc<Slideshow>> {
        self.cache.snapshot()
    }

    pub fn cache(&self) -> &NotificationCache<Slideshow> {
        &self.cache
    }
}
