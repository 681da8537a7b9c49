//! Adattatore tra il feed eventi di un job e uno `Stream` consumabile via SSE

use futures::stream::{self, Stream};

use crate::models::JobEvent;
use crate::services::store::EventSubscription;

/// Produce gli eventi del job in ordine e termina dopo il primo evento
/// terminale, o quando il job viene rimosso dallo store.
pub fn event_stream(subscription: EventSubscription) -> impl Stream<Item = JobEvent> + Send {
    stream::unfold(Some(subscription), |state| async move {
        let mut subscription = state?;
        let event = subscription.next().await?;
        // dopo l'evento terminale la subscription viene rilasciata
        let next = if event.is_terminal() {
            None
        } else {
            Some(subscription)
        };
        Some((event, next))
    })
}
