//! Price levels over an order slab
//!
//! All resting orders of a book live in one `OrderPool` (a slab indexed by
//! `usize`, with a free list for reuse). A `PriceLevel` is a doubly linked
//! FIFO threaded through that slab, so removing any order is O(1) once its
//! slot is known.

use crate::domain::order::Order;

/// 订单簿中的一个节点，代表一个具体的订单
#[derive(Debug, Clone)]
pub(crate) struct OrderNode {
    pub order: Order,
    // 指向同一个价格队列中的上一个订单
    pub prev: Option<usize>,
    // 指向同一个价格队列中的下一个订单
    pub next: Option<usize>,
}

#[derive(Debug, Clone)]
enum Slot {
    Occupied(OrderNode),
    Free { next_free: Option<usize> },
}

/// 订单节点池，所有挂单实体都存放在这里
#[derive(Debug, Clone, Default)]
pub(crate) struct OrderPool {
    slots: Vec<Slot>,
    // 空闲节点链表的头指针，用于复用已删除的订单节点空间
    free_list_head: Option<usize>,
    len: usize,
}

impl OrderPool {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free_list_head: None,
            len: 0,
        }
    }

    /// Stores an unlinked order and returns its slot
    pub fn insert(&mut self, order: Order) -> usize {
        let node = OrderNode {
            order,
            prev: None,
            next: None,
        };
        self.len += 1;

        // 优先从 free list 中获取
        if let Some(free_index) = self.free_list_head {
            if let Slot::Free { next_free } = self.slots[free_index] {
                self.free_list_head = next_free;
                self.slots[free_index] = Slot::Occupied(node);
                return free_index;
            }
            panic!("free list points at occupied slot {}", free_index);
        }

        self.slots.push(Slot::Occupied(node));
        self.slots.len() - 1
    }

    /// Releases a slot and hands back its order
    ///
    /// The caller must have unlinked the node from its level first.
    pub fn remove(&mut self, slot: usize) -> Order {
        let freed = Slot::Free {
            next_free: self.free_list_head,
        };
        match std::mem::replace(&mut self.slots[slot], freed) {
            Slot::Occupied(node) => {
                self.free_list_head = Some(slot);
                self.len -= 1;
                node.order
            }
            Slot::Free { next_free } => {
                self.slots[slot] = Slot::Free { next_free };
                panic!("order slot {} released twice", slot);
            }
        }
    }

    pub fn get(&self, slot: usize) -> Option<&OrderNode> {
        match self.slots.get(slot) {
            Some(Slot::Occupied(node)) => Some(node),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, slot: usize) -> Option<&mut OrderNode> {
        match self.slots.get_mut(slot) {
            Some(Slot::Occupied(node)) => Some(node),
            _ => None,
        }
    }

    /// Node access for slots the book's index vouches for
    pub fn node(&self, slot: usize) -> &OrderNode {
        match self.get(slot) {
            Some(node) => node,
            None => panic!("order slot {} is not occupied", slot),
        }
    }

    pub fn node_mut(&mut self, slot: usize) -> &mut OrderNode {
        match self.get_mut(slot) {
            Some(node) => node,
            None => panic!("order slot {} is not occupied", slot),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }
}

/// 一个价格层级的所有挂单，以双向链表形式存在
///
/// Insertion order is time priority. A level is never left empty inside a
/// book side; the book drops it when its last order goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceLevel {
    price: u64,
    // 链表头
    head: Option<usize>,
    // 链表尾
    tail: Option<usize>,
    /// Sum of open quantity over the queue
    volume: u64,
    order_count: usize,
}

impl PriceLevel {
    pub fn new(price: u64) -> Self {
        Self {
            price,
            head: None,
            tail: None,
            volume: 0,
            order_count: 0,
        }
    }

    #[inline]
    pub fn price(&self) -> u64 {
        self.price
    }

    /// Total open quantity resting at this price
    #[inline]
    pub fn volume(&self) -> u64 {
        self.volume
    }

    /// Number of resting orders
    #[inline]
    pub fn len(&self) -> usize {
        self.order_count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Slot of the oldest order
    #[inline]
    pub(crate) fn front(&self) -> Option<usize> {
        self.head
    }

    /// 将节点添加到价格队列的尾部
    pub(crate) fn push_back(&mut self, pool: &mut OrderPool, slot: usize) {
        let open = pool.node(slot).order.open_quantity();

        if let Some(tail_index) = self.tail {
            pool.node_mut(tail_index).next = Some(slot);
            let node = pool.node_mut(slot);
            node.prev = Some(tail_index);
            node.next = None;
        } else {
            // 队列为空
            let node = pool.node_mut(slot);
            node.prev = None;
            node.next = None;
            self.head = Some(slot);
        }

        self.tail = Some(slot);
        self.volume += open;
        self.order_count += 1;
    }

    /// 从价格队列的双向链表中移除节点
    ///
    /// The slot stays occupied in the pool; the caller releases it.
    pub(crate) fn unlink(&mut self, pool: &mut OrderPool, slot: usize) {
        let (prev, next, open) = {
            let node = pool.node(slot);
            (node.prev, node.next, node.order.open_quantity())
        };

        match prev {
            Some(prev_index) => pool.node_mut(prev_index).next = next,
            None => self.head = next,
        }
        match next {
            Some(next_index) => pool.node_mut(next_index).prev = prev,
            None => self.tail = prev,
        }

        let node = pool.node_mut(slot);
        node.prev = None;
        node.next = None;

        self.volume -= open;
        self.order_count -= 1;
    }

    /// Accounts for an execution against one of the level's orders
    #[inline]
    pub(crate) fn reduce_volume(&mut self, quantity: u64) {
        self.volume -= quantity;
    }

    /// Orders in time priority
    pub(crate) fn iter<'a>(&self, pool: &'a OrderPool) -> LevelIter<'a> {
        LevelIter {
            pool,
            cursor: self.head,
        }
    }
}

pub(crate) struct LevelIter<'a> {
    pool: &'a OrderPool,
    cursor: Option<usize>,
}

impl<'a> Iterator for LevelIter<'a> {
    type Item = (usize, &'a Order);

    fn next(&mut self) -> Option<Self::Item> {
        let slot = self.cursor?;
        let node = self.pool.node(slot);
        self.cursor = node.next;
        Some((slot, &node.order))
    }
}
