// Communication channels lock-free

use crate::messaging::command::TransportCommand;
use ringbuf::{HeapRb, traits::Split};

pub type CommandProducer = ringbuf::HeapProd<TransportCommand>;
pub type CommandConsumer = ringbuf::HeapCons<TransportCommand>;

pub fn create_command_channel(capacity: usize) -> (CommandProducer, CommandConsumer) {
    let rb = HeapRb::<TransportCommand>::new(capacity);
    rb.split()
}
