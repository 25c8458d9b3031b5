//! The travel-booking saga: flight, hotel and payment services.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use saga::{CommandError, SagaDefinitionBuilder, StepBuilder, StepCommand};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const FLIGHT_CHANNEL: &str = "FlightBookingService";
pub const HOTEL_CHANNEL: &str = "HotelBookingService";
pub const PAYMENT_CHANNEL: &str = "PaymentService";

/// Payload of a travel saga instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trip {
    pub id: u64,
}

/// Errors returned by booking services.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BookingError {
    #[error("{service} declined trip {trip_id}")]
    Declined { service: &'static str, trip_id: u64 },

    #[error("{service} could not cancel trip {trip_id}")]
    CancellationFailed { service: &'static str, trip_id: u64 },
}

impl From<BookingError> for CommandError {
    fn from(err: BookingError) -> Self {
        CommandError::new(err.to_string())
    }
}

/// A remote service that reserves something for a trip and can release it.
#[async_trait]
pub trait BookingService: Send + Sync {
    /// Reserves for `trip`, returning the booking reference.
    async fn book(&self, trip: &Trip) -> Result<String, BookingError>;

    /// Releases the reservation held for `trip`, if any.
    async fn cancel(&self, trip: &Trip) -> Result<(), BookingError>;
}

#[derive(Debug, Default)]
struct InMemoryBookingState {
    bookings: HashMap<u64, String>,
    next_id: u32,
    fail_on_book: bool,
    fail_on_cancel: bool,
}

/// In-memory booking service.
#[derive(Debug, Clone)]
pub struct InMemoryBookingService {
    name: &'static str,
    prefix: &'static str,
    state: Arc<RwLock<InMemoryBookingState>>,
}

impl InMemoryBookingService {
    /// Creates a service named `name` whose references start with `prefix`.
    pub fn new(name: &'static str, prefix: &'static str) -> Self {
        Self {
            name,
            prefix,
            state: Arc::default(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Configures the service to decline every booking.
    pub fn set_fail_on_book(&self, fail: bool) {
        self.state.write().unwrap().fail_on_book = fail;
    }

    /// Configures the service to fail every cancellation.
    pub fn set_fail_on_cancel(&self, fail: bool) {
        self.state.write().unwrap().fail_on_cancel = fail;
    }

    /// Returns the number of active bookings.
    pub fn booking_count(&self) -> usize {
        self.state.read().unwrap().bookings.len()
    }

    /// Returns the booking reference held for `trip_id`.
    pub fn booking(&self, trip_id: u64) -> Option<String> {
        self.state.read().unwrap().bookings.get(&trip_id).cloned()
    }
}

#[async_trait]
impl BookingService for InMemoryBookingService {
    async fn book(&self, trip: &Trip) -> Result<String, BookingError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_book {
            return Err(BookingError::Declined {
                service: self.name,
                trip_id: trip.id,
            });
        }

        state.next_id += 1;
        let reference = format!("{}-{:04}", self.prefix, state.next_id);
        state.bookings.insert(trip.id, reference.clone());
        tracing::info!(service = self.name, trip_id = trip.id, %reference, "booked");

        Ok(reference)
    }

    async fn cancel(&self, trip: &Trip) -> Result<(), BookingError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_cancel {
            return Err(BookingError::CancellationFailed {
                service: self.name,
                trip_id: trip.id,
            });
        }

        if let Some(reference) = state.bookings.remove(&trip.id) {
            tracing::info!(service = self.name, trip_id = trip.id, %reference, "cancelled");
        }
        Ok(())
    }
}

/// Forward command: books with the wrapped service.
pub struct Book<S>(pub S);

#[async_trait]
impl<S: BookingService> StepCommand<Trip> for Book<S> {
    async fn execute(&self, trip: Trip) -> Result<(), CommandError> {
        self.0.book(&trip).await?;
        Ok(())
    }
}

/// Compensation command: cancels with the wrapped service.
pub struct Cancel<S>(pub S);

#[async_trait]
impl<S: BookingService> StepCommand<Trip> for Cancel<S> {
    async fn execute(&self, trip: Trip) -> Result<(), CommandError> {
        self.0.cancel(&trip).await?;
        Ok(())
    }
}

/// The booking services taking part in a travel saga.
#[derive(Debug, Clone)]
pub struct TravelServices {
    pub flight: InMemoryBookingService,
    pub hotel: InMemoryBookingService,
    pub payment: InMemoryBookingService,
}

impl TravelServices {
    pub fn new() -> Self {
        Self {
            flight: InMemoryBookingService::new(FLIGHT_CHANNEL, "FLT"),
            hotel: InMemoryBookingService::new(HOTEL_CHANNEL, "HTL"),
            payment: InMemoryBookingService::new(PAYMENT_CHANNEL, "PAY"),
        }
    }

    /// Looks a service up by channel name or short name (`flight`, `hotel`,
    /// `payment`), ignoring case.
    pub fn find(&self, name: &str) -> Option<&InMemoryBookingService> {
        let name = name.trim().to_ascii_lowercase();
        if name.is_empty() {
            return None;
        }
        self.all()
            .into_iter()
            .find(|service| service.name().to_ascii_lowercase().starts_with(&name))
    }

    /// Services in saga step order.
    pub fn all(&self) -> [&InMemoryBookingService; 3] {
        [&self.flight, &self.hotel, &self.payment]
    }

    /// Describes the travel saga: flight, then hotel, then payment, each
    /// compensated by a cancellation.
    pub fn saga(&self) -> StepBuilder<Trip> {
        SagaDefinitionBuilder::new()
            .step(FLIGHT_CHANNEL)
            .on_reply(Book(self.flight.clone()))
            .with_compensation(Cancel(self.flight.clone()))
            .step(HOTEL_CHANNEL)
            .on_reply(Book(self.hotel.clone()))
            .with_compensation(Cancel(self.hotel.clone()))
            .step(PAYMENT_CHANNEL)
            .on_reply(Book(self.payment.clone()))
            .with_compensation(Cancel(self.payment.clone()))
    }
}

impl Default for TravelServices {
    fn default() -> Self {
        Self::new()
    }
}
